// src/config/mod.rs

//! Configuration loading and validation for sigil.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate ids and engine settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    parse_duration, CommandSection, ConfigFile, EngineConfig, EngineSection, RawConfigFile,
};
