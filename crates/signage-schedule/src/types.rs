//! Schedule model (spec.md §3, "Schedule model").

use crate::criteria::Criterion;
use crate::geo::GeoFence;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceType {
    None,
    Week,
}

/// `{type, detail, range}`. `detail_bitset` uses bit `0` for Monday through
/// bit `6` for Sunday (ISO day-of-week order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    pub detail_bitset: u8,
    pub range: Option<DateTime<Utc>>,
}

impl Recurrence {
    pub fn includes_day(&self, iso_day: u32) -> bool {
        debug_assert!((1..=7).contains(&iso_day));
        self.detail_bitset & (1 << (iso_day - 1)) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleItemKind {
    Layout(u64),
    Campaign(Vec<u64>),
}

/// One entry from the schedule document: a standalone layout, a campaign,
/// or an interrupt (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub schedule_id: u64,
    pub from_dt: DateTime<Utc>,
    pub to_dt: DateTime<Utc>,
    pub priority: i32,
    pub recurrence: Option<Recurrence>,
    pub share_of_voice: Option<u8>,
    pub max_plays_per_hour: Option<u32>,
    pub is_geo_aware: bool,
    pub geo_location: Option<String>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    pub duration_secs: Option<f64>,
    pub kind: ScheduleItemKind,
}

impl ScheduleItem {
    pub fn geo_fence(&self) -> Option<GeoFence> {
        self.geo_location.as_deref().and_then(GeoFence::parse)
    }

    /// Time-of-day bounds for a recurring item (spec.md §9, Open Question
    /// #2: `fromDt`/`toDt` are read as time-of-day when a recurrence is
    /// present).
    pub fn time_of_day_bounds(&self) -> (NaiveTime, NaiveTime) {
        (self.from_dt.time(), self.to_dt.time())
    }
}

pub type Overlay = ScheduleItem;

/// `(default_layout_id, layouts[], campaigns[], overlays[])` (spec.md §3).
/// Campaigns are folded into `items` alongside standalone layouts; their
/// `kind` distinguishes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleModel {
    pub default_layout_id: u64,
    pub items: Vec<ScheduleItem>,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
}

/// One slot in a resolved play sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPlay {
    pub schedule_id: u64,
    pub layout_id: u64,
}
