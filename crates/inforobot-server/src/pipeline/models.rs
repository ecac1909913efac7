//! Request records as the pipeline sees them

use chrono::{DateTime, Utc};
use inforobot_common::types::RequestStatus;
use serde::{Deserialize, Serialize};

/// One submitted URL and its processing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Internal surrogate key, only used for ordering
    #[serde(skip_serializing, default)]
    pub id: i64,
    pub index_id: String,
    pub url: String,
    /// Extracted text when complete, error description when failed
    pub content: Option<String>,
    pub status: RequestStatus,
    /// Lease held by the worker currently processing the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Whether the sweep should hand this request to a worker again
    pub fn needs_processing(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RequestStatus::Pending | RequestStatus::Failed => true,
            RequestStatus::Processing => self.claimed_until.map_or(true, |until| until < now),
            RequestStatus::Complete => false,
        }
    }
}

/// Row of the public index listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexEntry {
    pub index_id: String,
    pub address: String,
}

/// Result of a worker trying to claim a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Status is now PROCESSING under this worker's lease
    Claimed,
    /// Already COMPLETE; nothing to do
    AlreadyComplete,
    /// Another worker holds a live lease
    Busy,
    /// No request with that index id
    Missing,
}
