//! Shared utilities for feature modules
//!
//! - **validation**: input checks used by commands
//! - **test_helpers**: in-memory feature state and response decoding (test-only)

pub mod validation;

#[cfg(test)]
pub mod test_helpers;

pub use validation::{validate_content, validate_url, ContentValidationError, UrlValidationError};
