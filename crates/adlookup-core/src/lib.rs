//! # adlookup-core
//!
//! Core types and utilities shared by the directory lookup crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and structured error responses
//! - [`credentials`] - Directory bind credentials
//! - [`config`] - Cloud Foundry service-binding configuration (`VCAP_SERVICES`)

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod error;

// Re-export commonly used types
pub use error::{Error, Result};
