//! # Sop Repository
//!
//! ```text
//! Controller
//!   ↓  Arc<dyn SchoolRepository>
//! MySqlSchoolRepository      (SQLx, MySQL)
//! InMemorySchoolRepository   (seeded, no database configured)
//! ```

pub mod memory;
pub mod mysql;
pub mod pool;
pub mod school;
pub mod traits;

pub use memory::InMemorySchoolRepository;
pub use mysql::MySqlSchoolRepository;
pub use pool::*;
pub use school::School;
pub use traits::*;
