//! MySQL school repository.

use crate::{traits::SchoolRepository, DatabasePool, School};
use async_trait::async_trait;
use sop_core::{Page, PageRequest, SopResult};
use std::sync::Arc;
use tracing::debug;

/// Reads schools from the `schools` table.
#[derive(Clone)]
pub struct MySqlSchoolRepository {
    pool: Arc<DatabasePool>,
}

impl MySqlSchoolRepository {
    #[must_use]
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchoolRepository for MySqlSchoolRepository {
    async fn find_page(&self, page: PageRequest) -> SopResult<Page<School>> {
        debug!("Finding schools, page: {}, size: {}", page.page, page.size);

        let total = self.count().await?;

        let content = sqlx::query_as::<_, School>(
            r#"
            SELECT id, name, address, created_at
            FROM schools
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit() as u64)
        .bind(page.offset() as u64)
        .fetch_all(self.pool.inner())
        .await?;

        Ok(Page::new(content, page, total))
    }

    async fn count(&self) -> SopResult<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schools")
            .fetch_one(self.pool.inner())
            .await?;
        Ok(u64::try_from(total).unwrap_or_default())
    }
}
