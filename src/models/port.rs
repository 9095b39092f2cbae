// src/models/port.rs

//! Port master list.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A port of call and the weather station that covers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Port code (e.g. "TWKHH")
    pub code: String,

    /// Bulletin station identifier
    pub station_id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub country: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Read-only mapping of port code to port metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortRegistry {
    #[serde(default)]
    pub ports: Vec<PortInfo>,
}

impl PortRegistry {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self { ports }
    }

    /// Load the port list from a TOML file with `[[ports]]` entries.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Look up a port by code, ignoring case.
    pub fn get(&self, code: &str) -> Option<&PortInfo> {
        self.ports
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(code))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortInfo> {
        self.ports.iter()
    }

    /// Resolve the requested codes, or every port when none are given.
    pub fn select(&self, codes: &[String]) -> Result<Vec<PortInfo>> {
        if codes.is_empty() {
            return Ok(self.ports.clone());
        }
        codes
            .iter()
            .map(|code| {
                self.get(code)
                    .cloned()
                    .ok_or_else(|| AppError::validation(format!("Unknown port code: {}", code)))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(AppError::validation("No ports defined"));
        }

        let mut seen = HashSet::new();
        for port in &self.ports {
            if port.code.trim().is_empty() {
                return Err(AppError::validation("Port with empty code"));
            }
            if !seen.insert(port.code.to_uppercase()) {
                return Err(AppError::validation(format!(
                    "Duplicate port code: {}",
                    port.code
                )));
            }
            if port.station_id.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "Port {} has no station_id",
                    port.code
                )));
            }
            if let Some(lat) = port.latitude {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(AppError::validation(format!(
                        "Port {} latitude out of range: {}",
                        port.code, lat
                    )));
                }
            }
            if let Some(lon) = port.longitude {
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(AppError::validation(format!(
                        "Port {} longitude out of range: {}",
                        port.code, lon
                    )));
                }
            }
        }
        Ok(())
    }
}
