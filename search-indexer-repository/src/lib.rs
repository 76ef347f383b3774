//! # Search Indexer Repository
//!
//! This crate provides the traits and implementations the build pipeline uses
//! to reach its external state: the search engine handle, the change
//! notification store and the build status store. It includes an OpenSearch
//! engine implementation plus in-memory and file-backed stores.

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod stores;

pub use errors::SearchError;
pub use interfaces::{BuildStatusStore, NotificationStore, SearchEngineClient};
pub use opensearch::OpenSearchClient;
pub use stores::{
    InMemoryBuildStatusStore, InMemoryNotificationStore, JsonFileBuildStatusStore,
    JsonFileNotificationStore,
};
