//! Config module - file + environment configuration

pub mod toml_config;

pub use toml_config::{
    apply_env_overrides, default_config_path, load_toml_config, save_toml_config, ConfigError,
    TomlConfig,
};
