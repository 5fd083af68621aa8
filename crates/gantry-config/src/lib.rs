//! Configuration parsing for Gantry.
//!
//! This crate handles parsing of:
//! - Build manifests (integration.yml)
//! - Branch glob patterns
//! - The build step environment
//! - System configuration (gantry.kdl)

pub mod environment;
pub mod error;
pub mod pattern;
pub mod manifest;
pub mod system;

pub use environment::BuildEnvironmentBuilder;
pub use error::{ConfigError, ConfigResult};
pub use pattern::BranchPattern;
pub use manifest::{DEFAULT_MANIFEST, Manifest, ManifestError, ManifestResult};
pub use system::SystemConfig;
