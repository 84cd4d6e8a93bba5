//! The Sentinela engine binary: Controller, Executor, monitors loader,
//! outbox publisher, and the thin HTTP surface, wired over the shared
//! [`state::AppState`].

pub mod config;
pub mod controller;
pub mod executor;
pub mod http;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod monitors;
pub mod outbox;
pub mod state;
