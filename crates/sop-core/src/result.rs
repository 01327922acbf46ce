//! Result type aliases.

use crate::SopError;

/// A specialized `Result` type for Sop operations.
pub type SopResult<T> = Result<T, SopError>;
