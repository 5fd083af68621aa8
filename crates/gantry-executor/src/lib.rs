//! Step execution backend for Gantry.
//!
//! Runs each pipeline step as `sh -c <snippet>` on the worker host.

pub mod shell;

pub use gantry_core::executor::{StepExecutor, StepOutput};
pub use shell::ShellExecutor;
