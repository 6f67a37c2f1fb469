//! Webhook batch fan-out and resource archiving.
//!
//! `process-hook` turns one compressed webhook batch into a `save-resource`
//! task per event; `save-resource` fetches the referenced resource and
//! stores it as an [`ArchiveRecord`](crate::store::ArchiveRecord).

mod error;
mod event;
mod process_hook;
mod save_resource;

pub use error::{ArchiveError, ArchiveResult};
pub use event::{EventData, EventRecord, ResourceId, UnsupportedId, decode_batch};
pub use process_hook::process_hook;
pub use save_resource::{APPLICATION_KEY_HEADER, Archiver};
