//! # Search Indexer Pipeline
//!
//! This crate provides the build pipeline that keeps the search indexes in
//! step with the system of record.
//!
//! ## Architecture
//!
//! A build flows leaf-first through these components:
//!
//! 1. **Policy**: decides when to send batches, commit and optimize
//! 2. **Existence**: tells whether a usable physical index is present
//! 3. **Resolver**: unions the builder's storage delta with pending notifications
//! 4. **Publisher**: gets document mutations into the engine
//! 5. **Orchestrator**: picks rebuild or incremental, drives the rest and
//!    finalizes the build status

pub mod builder;
pub mod errors;
pub mod existence;
pub mod orchestrator;
pub mod policy;
pub mod publisher;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{IndexBuilder, PipelineStatus};
pub use errors::PipelineError;
pub use existence::{EngineIndexExistence, FsIndexExistence, IndexExistencePredicate, INITIAL_INDEX_VERSION};
pub use orchestrator::{BuildMode, BuildReport, IndexBuildOrchestrator, OrchestratorConfig, RebuildReason};
pub use policy::{BuildPolicy, BuildPolicyConfig, BuildPolicyContext};
pub use publisher::{
    DocumentPublisher, QueueingDocumentPublisher, QueueingPublisherConfig, SimpleDocumentPublisher,
};
pub use resolver::{ChangeDelta, ChangeDeltaResolver};
