//! Application configuration module.
//!
//! Manages the TOML config file holding API credentials, base URL
//! overrides and HTTP settings.

#[allow(clippy::module_inception)]
mod config;

#[allow(clippy::module_name_repetitions)]
pub use config::{AppConfig, HttpConfig, OmdbConfig, TmdbConfig, resolve_secret};
