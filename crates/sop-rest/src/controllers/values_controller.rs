//! Example listing controller.

use crate::{
    responses::{ok, ApiResult},
    state::AppState,
};
use axum::{extract::State, routing::get, Router};
use sop_core::PageRequest;
use sop_repository::School;
use tracing::debug;

/// Creates the values router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_values))
}

/// Returns the first page of schools, ten per page, as a bare JSON array.
async fn list_values(State(state): State<AppState>) -> ApiResult<Vec<School>> {
    let request = PageRequest::first();
    let page = state.schools.find_page(request).await?;
    debug!(
        returned = page.len(),
        total = page.total_elements,
        "Listed values page"
    );
    ok(page.content)
}
