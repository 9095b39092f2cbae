// src/services/classifier.rs

//! Wind and wave risk classification.
//!
//! Each record is scored against three independent metrics (wind speed,
//! wind gust, significant wave height). A record's level is the highest level
//! any single metric reaches; levels never add up across metrics. The
//! bulletin level is the highest record level.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::error::Result;
use crate::models::{
    BulletinRecord, ExtremeValue, Metric, RiskAssessment, RiskConfig, RiskLevel, RiskPeriod,
    ThresholdProfile,
};

const METRICS: [Metric; 3] = [Metric::WindSpeed, Metric::WindGust, Metric::WaveHeight];

/// Scores records against a threshold profile.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    profile: ThresholdProfile,
    offset: FixedOffset,
}

impl RiskClassifier {
    /// Create a classifier with an explicit profile and local offset.
    pub fn new(profile: ThresholdProfile, offset: FixedOffset) -> Self {
        Self { profile, offset }
    }

    /// Create a classifier from the `[risk]` configuration section.
    pub fn from_config(risk: &RiskConfig) -> Result<Self> {
        Ok(Self::new(risk.active_profile()?, risk.local_offset()?))
    }

    pub fn profile(&self) -> &ThresholdProfile {
        &self.profile
    }

    /// Level reached by a single metric value.
    pub fn metric_level(&self, metric: Metric, value: f64) -> RiskLevel {
        self.profile.tiers(metric).level_for(value)
    }

    /// Score one record: the maximum level across metrics, plus one reason per triggered metric.
    pub fn analyze_record(&self, record: &BulletinRecord) -> (RiskLevel, Vec<String>) {
        let mut level = RiskLevel::Safe;
        let mut reasons = Vec::new();

        for metric in METRICS {
            let value = metric.value_of(record);
            let metric_level = self.metric_level(metric, value);
            if let Some(threshold) = self.profile.tiers(metric).threshold(metric_level) {
                reasons.push(format!(
                    "{} {:.1} {} >= {} threshold {:.1} {}",
                    metric.label(),
                    value,
                    metric.unit(),
                    metric_level,
                    threshold,
                    metric.unit()
                ));
            }
            level = level.max(metric_level);
        }

        (level, reasons)
    }

    /// Assess a bulletin's records.
    ///
    /// Records are taken in the order given; ties for an extreme keep the
    /// first occurrence.
    pub fn analyze_bulletin(&self, port_code: &str, records: &[BulletinRecord]) -> RiskAssessment {
        let mut level = RiskLevel::Safe;
        let mut risk_periods = Vec::new();

        for record in records {
            let (record_level, reasons) = self.analyze_record(record);
            if record_level > RiskLevel::Safe {
                risk_periods.push(RiskPeriod {
                    record: record.clone(),
                    level: record_level,
                    reasons,
                });
            }
            level = level.max(record_level);
        }

        let max_wind = self.extreme(Metric::WindSpeed, records);
        let max_gust = self.extreme(Metric::WindGust, records);
        let max_wave = self.extreme(Metric::WaveHeight, records);

        let risk_factors = [&max_wind, &max_gust, &max_wave]
            .into_iter()
            .flatten()
            .filter_map(|extreme| self.describe_extreme(extreme))
            .collect();

        if level == RiskLevel::Safe {
            risk_periods.clear();
        }

        RiskAssessment {
            port_code: port_code.to_string(),
            profile: self.profile.name.clone(),
            level,
            risk_factors,
            max_wind,
            max_gust,
            max_wave,
            risk_periods,
        }
    }

    /// UTC and local civil time for a bulletin timestamp.
    pub fn to_zoned(&self, timestamp: NaiveDateTime) -> (DateTime<Utc>, DateTime<FixedOffset>) {
        let utc = timestamp.and_utc();
        (utc, utc.with_timezone(&self.offset))
    }

    fn extreme(&self, metric: Metric, records: &[BulletinRecord]) -> Option<ExtremeValue> {
        let mut best: Option<(usize, &BulletinRecord)> = None;
        for (i, record) in records.iter().enumerate() {
            let better = match best {
                Some((_, current)) => metric.value_of(record) > metric.value_of(current),
                None => true,
            };
            if better {
                best = Some((i, record));
            }
        }

        best.map(|(record_index, record)| {
            let (utc, local) = self.to_zoned(record.timestamp);
            ExtremeValue {
                metric,
                value: metric.value_of(record),
                utc,
                local,
                record_index,
            }
        })
    }

    fn describe_extreme(&self, extreme: &ExtremeValue) -> Option<String> {
        let level = self.metric_level(extreme.metric, extreme.value);
        if level == RiskLevel::Safe {
            return None;
        }
        Some(format!(
            "{} peaks at {:.1} {} ({}) at {} UTC / {} local",
            extreme.metric.label(),
            extreme.value,
            extreme.metric.unit(),
            level,
            extreme.utc.format("%Y-%m-%d %H:%M"),
            extreme.local.format("%Y-%m-%d %H:%M %:z")
        ))
    }
}
