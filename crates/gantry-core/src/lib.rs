//! Core domain types and traits for the Gantry CI backend.
//!
//! This crate contains:
//! - Build requests and their parsing from push payloads
//! - Build results and the status key scheme
//! - Step blocks (the unit of a pipeline)
//! - Seam traits for step execution, key-value storage, shard queues and
//!   version control

pub mod build;
pub mod error;
pub mod executor;
pub mod id;
pub mod pipeline;
pub mod queue;
pub mod result;
pub mod store;
pub mod vcs;

pub use build::BuildRequest;
pub use error::{BuildFailure, Error, Result};
pub use id::BuildId;
pub use pipeline::StepBlock;
pub use result::{BuildResult, StatusKey};
