// src/models/assessment.rs

//! Risk assessment data structures.

use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::models::BulletinRecord;

/// Ordinal severity, ascending.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe = 0,
    Caution = 1,
    Warning = 2,
    Danger = 3,
}

impl RiskLevel {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Caution => "caution",
            RiskLevel::Warning => "warning",
            RiskLevel::Danger => "danger",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The monitored metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    WindSpeed,
    WindGust,
    WaveHeight,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::WindSpeed => "Wind speed",
            Metric::WindGust => "Wind gust",
            Metric::WaveHeight => "Significant wave height",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::WindSpeed | Metric::WindGust => "kts",
            Metric::WaveHeight => "m",
        }
    }

    /// Read this metric's value from a record.
    pub fn value_of(&self, record: &BulletinRecord) -> f64 {
        match self {
            Metric::WindSpeed => record.wind_speed,
            Metric::WindGust => record.wind_gust,
            Metric::WaveHeight => record.wave_height,
        }
    }
}

/// Extreme value of one metric, with the time of the record that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremeValue {
    pub metric: Metric,
    pub value: f64,
    pub utc: DateTime<Utc>,
    pub local: DateTime<FixedOffset>,
    /// Index of the source record in the bulletin
    pub record_index: usize,
}

/// A record that triggered at least one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPeriod {
    pub record: BulletinRecord,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

/// Per-bulletin risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub port_code: String,

    /// Threshold profile used for this assessment
    pub profile: String,

    /// Maximum level across records
    pub level: RiskLevel,

    /// Human-readable descriptions referencing the extreme records
    pub risk_factors: Vec<String>,

    pub max_wind: Option<ExtremeValue>,
    pub max_gust: Option<ExtremeValue>,
    pub max_wave: Option<ExtremeValue>,

    /// Triggered records in bulletin order; empty when `level` is safe
    pub risk_periods: Vec<RiskPeriod>,
}

impl RiskAssessment {
    pub fn is_safe(&self) -> bool {
        self.level == RiskLevel::Safe
    }
}
