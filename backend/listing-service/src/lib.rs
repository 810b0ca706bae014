//! Listing service
//!
//! Serves ranked link listings per feed and across feeds from the shared
//! ranked cache, and keeps those listings current through a background task
//! queue fed by link writes.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod links;
pub mod listings;
pub mod metrics;

pub use config::Config;
pub use error::{AppError, Result};
