// src/models/bulletin.rs

//! Bulletin and weather record data structures.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One of the 16 standard compass points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compass {
    N = 0,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

impl Compass {
    /// All points, clockwise from north.
    pub const ALL: [Compass; 16] = [
        Compass::N,
        Compass::NNE,
        Compass::NE,
        Compass::ENE,
        Compass::E,
        Compass::ESE,
        Compass::SE,
        Compass::SSE,
        Compass::S,
        Compass::SSW,
        Compass::SW,
        Compass::WSW,
        Compass::W,
        Compass::WNW,
        Compass::NW,
        Compass::NNW,
    ];

    /// Parse a compass label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_uppercase();
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Compass::N => "N",
            Compass::NNE => "NNE",
            Compass::NE => "NE",
            Compass::ENE => "ENE",
            Compass::E => "E",
            Compass::ESE => "ESE",
            Compass::SE => "SE",
            Compass::SSE => "SSE",
            Compass::S => "S",
            Compass::SSW => "SSW",
            Compass::SW => "SW",
            Compass::WSW => "WSW",
            Compass::W => "W",
            Compass::WNW => "WNW",
            Compass::NW => "NW",
            Compass::NNW => "NNW",
        }
    }

    /// Bearing in degrees clockwise from true north.
    pub fn degrees(&self) -> f64 {
        *self as u8 as f64 * 22.5
    }
}

impl fmt::Display for Compass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single forecast row from a bulletin.
///
/// Direction fields keep the upper-cased label as printed by the source;
/// bearings are derived on demand and are `None` for labels outside the
/// 16-point compass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletinRecord {
    /// UTC civil time of the forecast step
    pub timestamp: NaiveDateTime,

    /// Wind direction label (e.g. "NNE")
    pub wind_direction: String,

    /// Sustained wind speed in knots
    pub wind_speed: f64,

    /// Wind gust in knots
    pub wind_gust: f64,

    /// Wave direction label
    pub wave_direction: String,

    /// Significant wave height in meters
    pub wave_height: f64,

    /// Maximum wave height in meters
    pub wave_max: f64,

    /// Wave period in seconds
    pub wave_period: f64,
}

impl BulletinRecord {
    pub fn wind_compass(&self) -> Option<Compass> {
        Compass::from_label(&self.wind_direction)
    }

    pub fn wave_compass(&self) -> Option<Compass> {
        Compass::from_label(&self.wave_direction)
    }

    /// Wind bearing in degrees, `None` when the label is not a compass point.
    pub fn wind_bearing(&self) -> Option<f64> {
        self.wind_compass().map(|c| c.degrees())
    }

    /// Wave bearing in degrees, `None` when the label is not a compass point.
    pub fn wave_bearing(&self) -> Option<f64> {
        self.wave_compass().map(|c| c.degrees())
    }
}

/// A parsed bulletin for one port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bulletin {
    /// Port code from the master list
    pub port_code: String,

    /// Port name as printed in the bulletin ("Unknown" when absent)
    pub port_name: String,

    /// Station identifier the bulletin was fetched for
    pub station_id: String,

    /// Issued-time label as given by the source; opaque
    pub issued_label: String,

    /// Records in source order
    pub records: Vec<BulletinRecord>,

    /// Non-fatal parse warnings, in line order
    pub warnings: Vec<String>,

    /// Raw bulletin text
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub raw_text: String,
}

impl Bulletin {
    /// Records whose wind or wave label is not a compass point.
    ///
    /// Returns `(record index, label)` pairs.
    pub fn direction_anomalies(&self) -> Vec<(usize, String)> {
        let mut anomalies = Vec::new();
        for (i, record) in self.records.iter().enumerate() {
            if record.wind_compass().is_none() {
                anomalies.push((i, record.wind_direction.clone()));
            }
            if record.wave_compass().is_none() {
                anomalies.push((i, record.wave_direction.clone()));
            }
        }
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(wind_dir: &str, wave_dir: &str) -> BulletinRecord {
        BulletinRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            wind_direction: wind_dir.to_string(),
            wind_speed: 12.0,
            wind_gust: 18.0,
            wave_direction: wave_dir.to_string(),
            wave_height: 1.1,
            wave_max: 1.6,
            wave_period: 6.0,
        }
    }

    #[test]
    fn test_compass_degrees() {
        assert_eq!(Compass::N.degrees(), 0.0);
        assert_eq!(Compass::NNE.degrees(), 22.5);
        assert_eq!(Compass::E.degrees(), 90.0);
        assert_eq!(Compass::SSW.degrees(), 202.5);
        assert_eq!(Compass::NNW.degrees(), 337.5);
    }

    #[test]
    fn test_compass_bearings_follow_clockwise_order() {
        for (i, point) in Compass::ALL.iter().enumerate() {
            assert_eq!(point.degrees(), i as f64 * 22.5, "{}", point);
        }
    }

    #[test]
    fn test_compass_from_label_is_case_insensitive() {
        assert_eq!(Compass::from_label("ese"), Some(Compass::ESE));
        assert_eq!(Compass::from_label(" NW "), Some(Compass::NW));
        assert_eq!(Compass::from_label("VRB"), None);
        assert_eq!(Compass::from_label(""), None);
    }

    #[test]
    fn test_unknown_label_is_not_north() {
        let rec = record("CALM", "N");
        assert_eq!(rec.wind_bearing(), None);
        assert_eq!(rec.wave_bearing(), Some(0.0));
    }

    #[test]
    fn test_direction_anomalies() {
        let bulletin = Bulletin {
            port_code: "KHH".into(),
            port_name: "KAOHSIUNG".into(),
            station_id: "46744".into(),
            issued_label: "2024/05/01 08:00".into(),
            records: vec![record("NE", "NE"), record("XX", "SW"), record("S", "??")],
            warnings: vec![],
            raw_text: String::new(),
        };
        assert_eq!(
            bulletin.direction_anomalies(),
            vec![(1, "XX".to_string()), (2, "??".to_string())]
        );
    }
}
