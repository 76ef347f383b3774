//! Interface definitions for the pipeline's external collaborators.
//!
//! These traits allow dependency injection and swappable backends for the
//! search engine and the bookkeeping stores.

mod build_status_store;
mod notification_store;
mod search_engine_client;

pub use build_status_store::BuildStatusStore;
pub use notification_store::NotificationStore;
pub use search_engine_client::SearchEngineClient;
