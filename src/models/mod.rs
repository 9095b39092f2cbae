// src/models/mod.rs

//! Domain models for the bulletin pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod assessment;
mod bulletin;
mod config;
mod credential;
mod port;
mod report;

// Re-export all public types
pub use assessment::{ExtremeValue, Metric, RiskAssessment, RiskLevel, RiskPeriod};
pub use bulletin::{Bulletin, BulletinRecord, Compass};
pub use config::{
    Config, FetchConfig, LoggingConfig, PASSWORD_ENV, PortalConfig, RiskConfig, SessionConfig,
    StorageConfig, ThresholdProfile, Tiers, USERNAME_ENV,
};
pub use credential::CredentialBundle;
pub use port::{PortInfo, PortRegistry};
pub use report::{CycleReport, PortOutcome, PortResult};
