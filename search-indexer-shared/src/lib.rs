//! # Search Indexer Shared
//!
//! Plain data types shared by the repository, pipeline and service crates of
//! the search index build pipeline.

mod document;
mod index_type;
mod notification;
mod status;

pub use document::{SearchDocument, Uid};
pub use index_type::{IndexType, UnknownIndexType};
pub use notification::{AffectedEntityType, IndexNotification, StoredNotification, UpdateType};
pub use status::{IndexBuildStatus, IndexStatus};
