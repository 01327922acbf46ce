//! # Sop REST
//!
//! Axum layer for the example service: the paginated `GET /api/values`
//! listing and the health checks.

pub mod controllers;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
