//! Application state for Axum handlers.

use sop_cache::CacheManager;
use sop_repository::SchoolRepository;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub schools: Arc<dyn SchoolRepository>,
    pub cache: Arc<dyn CacheManager>,
}

impl AppState {
    pub fn new(schools: Arc<dyn SchoolRepository>, cache: Arc<dyn CacheManager>) -> Self {
        Self { schools, cache }
    }
}
