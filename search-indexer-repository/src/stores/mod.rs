//! Store implementations for notifications and build status.

mod notifications;
mod status;

pub use notifications::{InMemoryNotificationStore, JsonFileNotificationStore};
pub use status::{InMemoryBuildStatusStore, JsonFileBuildStatusStore};
