//! Repository trait definitions.

use crate::School;
use async_trait::async_trait;
use sop_core::{Page, PageRequest, SopResult};

/// Read access to school records.
#[async_trait]
pub trait SchoolRepository: Send + Sync {
    /// Returns one page of schools ordered by id.
    async fn find_page(&self, page: PageRequest) -> SopResult<Page<School>>;

    /// Counts all schools.
    async fn count(&self) -> SopResult<u64>;
}
