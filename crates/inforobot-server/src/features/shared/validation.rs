//! Shared validation utilities

use thiserror::Error;

/// Longest URL accepted at submission
pub const MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("URL is required and cannot be empty")]
    Required,

    #[error("URL must be at most {max_length} characters")]
    TooLong { max_length: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContentValidationError {
    #[error("Content is required and cannot be empty")]
    Required,
}

/// Validate a submitted URL, returning it without surrounding whitespace
///
/// Any non-blank string is accepted; the enrichment service decides what it
/// can fetch.
pub fn validate_url(url: Option<&str>) -> Result<&str, UrlValidationError> {
    let url = url.map(str::trim).unwrap_or_default();

    if url.is_empty() {
        return Err(UrlValidationError::Required);
    }

    if url.chars().count() > MAX_URL_LENGTH {
        return Err(UrlValidationError::TooLong {
            max_length: MAX_URL_LENGTH,
        });
    }

    Ok(url)
}

pub fn validate_content(content: Option<&str>) -> Result<&str, ContentValidationError> {
    match content {
        Some(c) if !c.trim().is_empty() => Ok(c),
        _ => Err(ContentValidationError::Required),
    }
}
