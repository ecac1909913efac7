//! Inforobot Server Library
//!
//! HTTP service that accepts URLs, enriches them asynchronously through an
//! LLM extraction API, and stores the extracted text for later polling.
//!
//! # Overview
//!
//! - **API Endpoints**: submission, polling, manual correction, and the index
//! - **Pipeline**: job queue, processing workers, and the reconciliation sweep
//! - **Database Management**: PostgreSQL integration with SQLx
//! - **Configuration**: environment-based configuration via `dotenvy`
//! - **Middleware**: CORS and request tracing
//!
//! # Architecture
//!
//! Feature routes follow a command/query split: commands (`POST`, `PUT`,
//! `DELETE`) change request rows, queries (`GET`) read them. Both are plain
//! async handlers over the [`pipeline::RequestStore`] and
//! [`pipeline::JobQueue`] traits, which have PostgreSQL and in-memory
//! implementations.
//!
//! A submission writes a `pending` row and enqueues a `process_url` job. Workers
//! claim the row, call the enrichment service with bounded retry on rate
//! limiting, and record `complete` or `failed`. The sweep re-enqueues anything
//! left unfinished.
//!
//! # Example
//!
//! ```no_run
//! use inforobot_server::{config::Config, db};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod pipeline;

// Re-export commonly used types
pub use error::{AppError, AppResult};
