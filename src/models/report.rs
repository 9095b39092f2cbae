// src/models/report.rs

//! Per-port outcomes and cycle summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::models::{Bulletin, RiskAssessment, RiskLevel};

/// Result of processing one port in a fetch cycle.
///
/// "No risk" and "could not assess" are distinct variants so reporting never
/// confuses a failed port with a safe one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PortOutcome {
    /// At least one record reached caution or above
    Assessed {
        bulletin: Bulletin,
        assessment: RiskAssessment,
    },
    /// Every record is below the caution thresholds
    Safe {
        bulletin: Bulletin,
        assessment: RiskAssessment,
    },
    /// Issued label matches the last stored bulletin; nothing written, but
    /// the bulletin is still assessed so the port keeps its level
    Unchanged {
        bulletin: Bulletin,
        assessment: RiskAssessment,
    },
    Failed { kind: FailureKind, message: String },
}

impl PortOutcome {
    /// Build the success variant matching the assessment's level.
    pub fn from_assessment(bulletin: Bulletin, assessment: RiskAssessment) -> Self {
        if assessment.is_safe() {
            PortOutcome::Safe {
                bulletin,
                assessment,
            }
        } else {
            PortOutcome::Assessed {
                bulletin,
                assessment,
            }
        }
    }

    /// Mark an analysed outcome as a repeat of the stored bulletin.
    ///
    /// Failures pass through untouched.
    pub fn into_unchanged(self) -> Self {
        match self {
            PortOutcome::Assessed {
                bulletin,
                assessment,
            }
            | PortOutcome::Safe {
                bulletin,
                assessment,
            } => PortOutcome::Unchanged {
                bulletin,
                assessment,
            },
            other => other,
        }
    }

    /// Short status label for reporting.
    pub fn status(&self) -> &'static str {
        match self {
            PortOutcome::Assessed { assessment, .. } => assessment.level.as_str(),
            PortOutcome::Safe { .. } => "safe",
            PortOutcome::Unchanged { .. } => "unchanged",
            PortOutcome::Failed { kind, .. } => kind.as_str(),
        }
    }

    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            PortOutcome::Assessed { assessment, .. }
            | PortOutcome::Safe { assessment, .. }
            | PortOutcome::Unchanged { assessment, .. } => Some(assessment),
            PortOutcome::Failed { .. } => None,
        }
    }

    /// Risk level, when the port was assessed this cycle.
    pub fn level(&self) -> Option<RiskLevel> {
        self.assessment().map(|a| a.level)
    }

    pub fn bulletin(&self) -> Option<&Bulletin> {
        match self {
            PortOutcome::Assessed { bulletin, .. }
            | PortOutcome::Safe { bulletin, .. }
            | PortOutcome::Unchanged { bulletin, .. } => Some(bulletin),
            PortOutcome::Failed { .. } => None,
        }
    }

    /// Append a warning to the parsed bulletin, if there is one.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        if let PortOutcome::Assessed { bulletin, .. }
        | PortOutcome::Safe { bulletin, .. }
        | PortOutcome::Unchanged { bulletin, .. } = self
        {
            bulletin.warnings.push(warning.into());
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PortOutcome::Failed { .. })
    }
}

/// Outcome for a single port, keyed by code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortResult {
    pub port_code: String,
    #[serde(flatten)]
    pub outcome: PortOutcome,
}

/// Summary of one fetch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Threshold profile used for every assessment in the cycle
    pub profile: String,
    /// `true` when the cycle stopped before processing every requested port
    pub cancelled: bool,
    pub results: Vec<PortResult>,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&PortOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn assessed_count(&self) -> usize {
        self.count(|o| matches!(o, PortOutcome::Assessed { .. }))
    }

    pub fn safe_count(&self) -> usize {
        self.count(|o| matches!(o, PortOutcome::Safe { .. }))
    }

    pub fn unchanged_count(&self) -> usize {
        self.count(|o| matches!(o, PortOutcome::Unchanged { .. }))
    }

    pub fn failure_count(&self) -> usize {
        self.count(PortOutcome::is_failure)
    }

    pub fn get(&self, port_code: &str) -> Option<&PortOutcome> {
        self.results
            .iter()
            .find(|r| r.port_code == port_code)
            .map(|r| &r.outcome)
    }
}
