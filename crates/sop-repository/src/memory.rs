//! In-process school repository, used when no database is configured and in
//! tests.

use crate::{traits::SchoolRepository, School};
use async_trait::async_trait;
use parking_lot::RwLock;
use sop_core::{Page, PageRequest, SopResult};

#[derive(Debug, Default)]
pub struct InMemorySchoolRepository {
    schools: RwLock<Vec<School>>,
}

impl InMemorySchoolRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding `schools`, kept ordered by id.
    #[must_use]
    pub fn with_schools(mut schools: Vec<School>) -> Self {
        schools.sort_by_key(|s| s.id);
        Self {
            schools: RwLock::new(schools),
        }
    }

    /// Creates a repository with `count` generated schools, ids starting at 1.
    #[must_use]
    pub fn seeded(count: usize) -> Self {
        let schools = (1..=count)
            .map(|i| School::new(i as i64, format!("School {i}"), Some(format!("{i} Main Street"))))
            .collect();
        Self::with_schools(schools)
    }

    /// Adds or replaces a school.
    pub fn insert(&self, school: School) {
        let mut schools = self.schools.write();
        match schools.binary_search_by_key(&school.id, |s| s.id) {
            Ok(pos) => schools[pos] = school,
            Err(pos) => schools.insert(pos, school),
        }
    }
}

#[async_trait]
impl SchoolRepository for InMemorySchoolRepository {
    async fn find_page(&self, page: PageRequest) -> SopResult<Page<School>> {
        let schools = self.schools.read();
        Ok(Page::from_slice(schools.as_slice(), page))
    }

    async fn count(&self) -> SopResult<u64> {
        Ok(self.schools.read().len() as u64)
    }
}
