//! Job payloads carried by the queue

use serde::{Deserialize, Serialize};

use super::models::Request;

/// Process one request: call enrichment for `url` and record the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessUrlJob {
    pub url: String,
    pub index_id: String,
}

impl ProcessUrlJob {
    pub fn new(url: impl Into<String>, index_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index_id: index_id.into(),
        }
    }
}

impl From<&Request> for ProcessUrlJob {
    fn from(request: &Request) -> Self {
        Self::new(request.url.clone(), request.index_id.clone())
    }
}

/// Everything a worker can be asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    ProcessUrl(ProcessUrlJob),
    /// Run one reconciliation sweep
    Reconcile,
}

impl Job {
    /// Stable name stored alongside the payload
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ProcessUrl(_) => "process_url",
            Job::Reconcile => "reconcile",
        }
    }

    /// Identity of the unit of work; the queue keeps one active job per key
    pub fn dedupe_key(&self) -> String {
        match self {
            Job::ProcessUrl(job) => format!("process_url:{}", job.index_id),
            Job::Reconcile => "reconcile".to_string(),
        }
    }
}

impl From<ProcessUrlJob> for Job {
    fn from(job: ProcessUrlJob) -> Self {
        Job::ProcessUrl(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_url_payload_shape() {
        let job = Job::from(ProcessUrlJob::new("https://example.com", "abc"));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            json!({"kind": "process_url", "url": "https://example.com", "index_id": "abc"})
        );
        assert_eq!(job.kind(), value["kind"]);
    }

    #[test]
    fn test_reconcile_payload_shape() {
        let value = serde_json::to_value(Job::Reconcile).unwrap();
        assert_eq!(value, json!({"kind": "reconcile"}));
        let decoded: Job = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, Job::Reconcile);
    }

    #[test]
    fn test_dedupe_key_ignores_url() {
        let a = Job::from(ProcessUrlJob::new("https://a.example", "abc"));
        let b = Job::from(ProcessUrlJob::new("https://b.example", "abc"));
        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert_ne!(a.dedupe_key(), Job::Reconcile.dedupe_key());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = serde_json::from_value::<Job>(json!({"kind": "cleanup"}));
        assert!(result.is_err());
    }
}
