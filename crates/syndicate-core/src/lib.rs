//! # Syndicate Core
//!
//! Shared configuration and error types for the Syndicate workspace.

pub mod config;
pub mod error;

pub use config::{BuiltinTaskConfig, SyndicateConfig, TaskManagerConfig};
pub use error::{Result, SyndicateError};
