//! Mailroom Core Library
//!
//! Client for the Mailroom mail service: REST API access, session tokens,
//! and client-side orchestration of server sync and AI classification jobs.

pub mod api;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod models;
pub mod orchestrator;
pub mod token_store;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;

/// Application name for config paths
pub const APP_NAME: &str = "mailroom";
