// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading configuration
//! and the port list from files.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, PortRegistry};

/// Load configuration from a TOML file.
///
/// A missing file falls back to defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::warn!(
            "Config file {} not found, using default configuration",
            path.display()
        );
        return Ok(Config::default());
    }
    Config::load(path)
        .map_err(|e| AppError::config(format!("Failed to load {}: {e}", path.display())))
}

/// Load the port list from a TOML file.
pub fn load_ports(path: &Path) -> Result<PortRegistry> {
    PortRegistry::load(path)
        .map_err(|e| AppError::config(format!("Failed to load {}: {e}", path.display())))
}

/// Load and validate both config and port list.
pub fn load_all(config_path: &Path, ports_path: &Path) -> Result<(Config, PortRegistry)> {
    let config = load_config(config_path)?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration: {e}")))?;

    let ports = load_ports(ports_path)?;
    ports
        .validate()
        .map_err(|e| AppError::config(format!("Invalid port list: {e}")))?;

    log::debug!(
        "Loaded configuration from {} and {} port(s) from {}",
        config_path.display(),
        ports.len(),
        ports_path.display()
    );
    Ok((config, ports))
}
