//! Lifecycle glue tying the other crates into a running display: persisted
//! identity, the collection loop, status/log batching, and an optional
//! intra-host sync coordinator (spec.md §2, §4.7, §4.8).

mod error;
mod identity;
mod loop_;
mod reporter;
mod sync;

pub use error::{PlayerError, Result};
pub use identity::DisplayIdentity;
pub use loop_::{CollectionLoop, PushCommand};
pub use reporter::StatusReporter;
pub use sync::{BroadcastSyncBus, SyncBus, SyncSignal};
