//! Common utilities for hidlink
//!
//! This crate provides the ambient pieces shared by the workspace: logging
//! setup, configuration loading, shared error types and test helpers.

pub mod config;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use config::{BackendSettings, HidConfig, LoggingSettings, SessionSettings, load_config};
pub use error::{Error, Result};
pub use logging::setup_logging;
