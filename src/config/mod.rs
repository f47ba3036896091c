//! Configuration module for the packline build pipeline
//!
//! Provides types and parsing for `packline.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{
    default_config, find_config, find_config_from, load_config, load_config_file,
    merge_cli_overrides, CliOverrides, ConfigError, LoadedConfig, CONFIG_FILE,
};
pub use schema::*;
