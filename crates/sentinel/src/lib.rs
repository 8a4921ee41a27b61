//! Telemetry sentinel service
//!
//! HTTP transport and configuration around the `sentinel-lib` detection core.

pub mod api;
pub mod config;

pub use api::{create_router, serve, AppState};
pub use config::ServiceConfig;
