//! Shared types for the Rollbook attendance service
//!
//! Carries the error type, configuration file handling, and the domain
//! vocabulary (statuses, year levels) used by the API crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
