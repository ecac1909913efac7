//! Feature modules implementing the Inforobot API
//!
//! Each feature is a vertical slice with `commands/` (writes), `queries/`
//! (reads), and `routes.rs`. Commands and queries implement
//! `mediator::Request` so handlers stay independent of HTTP.
//!
//! - **requests**: submission, CRUD, and the index listing
//! - **jobs**: queue state of a submitted job

pub mod jobs;
pub mod requests;
pub mod shared;

use axum::Router;
use std::sync::Arc;

use crate::pipeline::{JobQueue, RequestStore};

/// Shared state for all feature routes
///
/// Handlers depend on the store and queue traits, so tests can mount the
/// routes over the in-memory implementations.
#[derive(Clone)]
pub struct FeatureState {
    pub store: Arc<dyn RequestStore>,
    pub queue: Arc<dyn JobQueue>,
}

/// Creates the API router with all feature routes mounted
///
/// - `/submit`, `/requests`, `/index` - request lifecycle
/// - `/jobs` - queue job status
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .merge(requests::requests_routes().with_state(state.clone()))
        .nest("/jobs", jobs::jobs_routes().with_state(state.queue.clone()))
}
