//! MySQL repository implementations.

mod school_repository;

pub use school_repository::MySqlSchoolRepository;
