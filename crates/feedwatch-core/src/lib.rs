//! feedwatch-core: pure types and state machines for incremental feed polling.
//!
//! Nothing in this crate performs IO or awaits. The cycle runner in
//! `feedwatch-engine` drives these pieces; adapters and sinks live elsewhere.

pub mod backoff;
pub mod dedup;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod types;

pub use backoff::{BackoffPolicy, BackoffTracker};
pub use dedup::{CyclePlan, plan_cycle};
pub use error::{
    CursorError, DeliveryError, ErrorKind, SourceError, classify_delivery_status, classify_status,
};
pub use lifecycle::{SourceState, SourceStatus};
pub use progress::DeliveryProgress;
pub use types::{
    BaselinePolicy, Entry, Item, ItemKey, MalformedItem, Payload, SourceDescriptor, display_cursor,
};
