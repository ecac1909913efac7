//! Jobs feature module
//!
//! Read-only access to the state of a queued job. Jobs are created by
//! submissions and the reconciliation sweep, never through this API.

pub mod queries;
pub mod routes;


pub use routes::jobs_routes;
