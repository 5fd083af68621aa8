//! HTTP server for Gantry.
//!
//! Receives push webhooks, queues builds and serves build status and
//! badges.

pub mod callback;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
