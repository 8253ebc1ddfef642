//! Shared types for the open-live client crates: errors, configuration,
//! and structured trace events.

pub mod config;
pub mod error;
pub mod trace;

pub use error::{Error, ProtocolError, Result};
