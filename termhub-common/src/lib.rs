//! Shared types for the Termhub services
//!
//! Provides the common error type, configuration loading, and the event bus
//! used by the ingest service and its observers.

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
