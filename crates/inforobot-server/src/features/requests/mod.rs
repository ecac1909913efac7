//! Request lifecycle feature
//!
//! Submission of URLs for enrichment, CRUD over stored requests, and the
//! public index of submitted addresses.

pub mod commands;
pub mod queries;
pub mod routes;


pub use routes::requests_routes;
