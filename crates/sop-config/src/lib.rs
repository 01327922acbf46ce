//! # Sop Config
//!
//! Layered configuration (files, `.env`, `SOP_` environment variables) and
//! the parser for Redis connection option strings.

mod app_config;
mod loader;
mod redis_options;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use redis_options::*;
pub use validation::*;
