//! Patchwright daemon: HTTP surface over the repair loop, the compile
//! service and the runtime bundle registry.
//!
//! - `POST /repair` runs the diagnostic-driven repair loop
//! - `POST /compile` compiles and previews a component
//! - `GET /runtime/:id` serves a registered runtime bundle
//! - `GET /health` reports liveness

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::{router, RepairResponse};
pub use state::AppState;
