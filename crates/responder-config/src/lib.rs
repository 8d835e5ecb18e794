//! Configuration for the Responder API client.
//!
//! Provides TOML-based configuration with:
//! - API location and request timeout (`[api]`)
//! - OAuth client identity and token endpoint (`[oauth]`)
//! - Token lifetimes and the proactive refresh window (`[tokens]`)
//! - Credential storage location (`[storage]`)
//!
//! Every section is optional; missing values fall back to the defaults the
//! mobile client ships with.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, save_config, xdg_config_dir, xdg_config_path, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;
