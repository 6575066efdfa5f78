//! Result type alias for harness operations

use crate::error::TestkitError;

/// Standard Result type for harness operations
pub type Result<T> = std::result::Result<T, TestkitError>;
