//! # Sop Core
//!
//! Error type, result alias and pagination primitives shared by the
//! cache facade, the repository layer and the REST layer.

pub mod error;
pub mod pagination;
pub mod result;

pub use error::*;
pub use pagination::*;
pub use result::*;
