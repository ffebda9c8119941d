//! Resolves an in-memory schedule model into the ordered layout sequence
//! to play now: dayparting recurrences, priority, campaigns, interrupts
//! (share-of-voice), criteria predicates, geo-fences, and per-layout play
//! caps (spec.md §4.5).

mod criteria;
mod error;
mod geo;
mod resolver;
mod types;

pub use criteria::{evaluate_all, Condition, Criterion, ValueType};
pub use error::{Result, ScheduleError};
pub use geo::{haversine_meters, GeoFence, DEFAULT_RADIUS_M};
pub use resolver::ScheduleResolver;
pub use types::{
    Overlay, PlannedPlay, Recurrence, RecurrenceType, ScheduleItem, ScheduleItemKind, ScheduleModel,
};
