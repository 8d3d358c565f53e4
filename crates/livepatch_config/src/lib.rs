//! Parsing and validation of `livepatch.toml` session configuration files.
//!
//! Every section is optional; an empty file yields [`LivePatchConfig::default`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
