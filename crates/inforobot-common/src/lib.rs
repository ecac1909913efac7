//! Inforobot Common Library
//!
//! Shared types, logging, and error handling for the Inforobot workspace.
//!
//! - **Error Handling**: [`InforobotError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Types**: [`types::RequestStatus`] and [`types::IndexId`]
//!
//! # Example
//!
//! ```no_run
//! use inforobot_common::logging::{init_logging, LogConfig};
//! use inforobot_common::types::RequestStatus;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let status = RequestStatus::from_code(0)?;
//!     tracing::info!(%status, "decoded");
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{InforobotError, Result};
