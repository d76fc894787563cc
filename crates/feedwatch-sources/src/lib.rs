//! feedwatch-sources: HTTP adapters for the supported providers.
//!
//! Each adapter implements [`feedwatch_engine::SourceAdapter`] and absorbs its
//! provider's response-shape quirks, so the engine only ever sees a flat list
//! of entries.

pub mod http;
pub mod posts;
pub mod schedule;
pub mod videos;

pub use http::{REQUEST_TIMEOUT, client};
pub use posts::{PostsAdapter, PostsConfig};
pub use schedule::{ScheduleAdapter, ScheduleConfig};
pub use videos::{VideosAdapter, VideosConfig};
