//! # Dishpatch Core
//!
//! Core types, configuration, and validation shared by every Dishpatch service.
//!
//! This crate provides:
//! - Configuration loading (JSON5 format) with environment overrides
//! - Principal identifiers, collections, and the closed role set
//! - Input validation and identifier normalization
//! - Secret wrappers that never reach logs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod secrets;
pub mod types;
pub mod validation;

pub use config::{AuthSettings, AuthSettingsBuilder, Config, ConfigError, ServiceSettings};
pub use secrets::{Password, SharedSecret};
pub use types::{PrincipalId, PrincipalKind, Role};
pub use validation::{RequiredFields, ValidationError, normalize_identifier};

