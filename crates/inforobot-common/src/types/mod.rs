//! Common types used across Inforobot

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InforobotError;

// ============================================================================
// Request Status
// ============================================================================

/// Processing state of a submitted request.
///
/// The numeric codes are what the `requests.status` column stores. PENDING and
/// FAILED are distinct states even though the reconciliation sweep treats both
/// as unfinished work.
///
/// # Examples
///
/// ```rust
/// use inforobot_common::types::RequestStatus;
///
/// let status = RequestStatus::from_code(2).unwrap();
/// assert_eq!(status, RequestStatus::Complete);
/// assert!(status.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Created, not yet successfully processed
    #[default]
    Pending,
    /// Claimed by a worker (advisory, lease-bound)
    Processing,
    /// Enrichment succeeded; content holds the extracted text
    Complete,
    /// Enrichment failed; content holds the error message
    Failed,
}

impl RequestStatus {
    /// Code stored in the database
    pub fn code(self) -> i16 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Processing => 1,
            RequestStatus::Complete => 2,
            RequestStatus::Failed => 3,
        }
    }

    /// Decode a stored status code
    pub fn from_code(code: i16) -> Result<Self, InforobotError> {
        match code {
            0 => Ok(RequestStatus::Pending),
            1 => Ok(RequestStatus::Processing),
            2 => Ok(RequestStatus::Complete),
            3 => Ok(RequestStatus::Failed),
            other => Err(InforobotError::InvalidStatus(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Complete => "complete",
            RequestStatus::Failed => "failed",
        }
    }

    /// No further automatic transition happens from a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Complete)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = InforobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "complete" | "completed" => Ok(RequestStatus::Complete),
            "failed" => Ok(RequestStatus::Failed),
            _ => Err(InforobotError::InvalidStatus(s.to_string())),
        }
    }
}

// ============================================================================
// Index Identifier
// ============================================================================

/// Externally visible identifier of a request.
///
/// Opaque to callers; generated once at creation and never changed. It is the
/// idempotency key for every later operation on the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(String);

impl IndexId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier received from a caller
    pub fn parse(raw: impl Into<String>) -> Result<Self, InforobotError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InforobotError::InvalidIndexId(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for IndexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IndexId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(RequestStatus::Pending.code(), 0);
        assert_eq!(RequestStatus::Processing.code(), 1);
        assert_eq!(RequestStatus::Complete.code(), 2);
        assert_eq!(RequestStatus::Failed.code(), 3);
    }

    #[test]
    fn test_unknown_status_code_is_rejected() {
        assert!(RequestStatus::from_code(7).is_err());
        assert!(RequestStatus::from_code(-1).is_err());
    }

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(RequestStatus::Complete.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Processing.is_terminal());
        assert!(!RequestStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("PENDING".parse::<RequestStatus>().unwrap(), RequestStatus::Pending);
        assert_eq!("completed".parse::<RequestStatus>().unwrap(), RequestStatus::Complete);
        assert_eq!(" failed ".parse::<RequestStatus>().unwrap(), RequestStatus::Failed);
        assert!("done".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RequestStatus::Complete).unwrap();
        assert_eq!(json, "\"complete\"");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = IndexId::generate();
        let b = IndexId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_blank_index_id_rejected() {
        assert!(IndexId::parse("").is_err());
        assert!(IndexId::parse("   ").is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_trims_surrounding_whitespace(id in "[a-zA-Z0-9-]{1,40}") {
            let parsed = IndexId::parse(format!("  {}\t", id)).unwrap();
            prop_assert_eq!(parsed.as_str(), id.as_str());
        }
    }
}
