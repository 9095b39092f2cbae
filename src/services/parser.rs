// src/services/parser.rs

//! Bulletin text parser.
//!
//! Converts the fixed-layout port forecast report into ordered
//! [`BulletinRecord`]s. The layout is:
//!
//! ```text
//! PORT NAME: KAOHSIUNG
//! STATION ID: 46744
//! ISSUED TIME: 2024/12/31 06:00 UTC
//!                       WIND                  WAVE
//! UTC       LOCAL      DIR  SPD  GST     DIR   SIG   MAX   PER
//! 1231 1800 0101 0200  NNE   18   24     NE    1.4   2.1   6.5
//! ...
//! *********************
//! ```
//!
//! Stray text inside the data section is skipped silently. Data lines that
//! cannot be converted are reported as warnings and skipped; only a missing
//! data section or a bulletin with no usable rows fails the parse.

use std::str::Lines;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

use crate::error::{AppError, FieldParseError, Result};
use crate::models::{Bulletin, BulletinRecord};

/// Four groups of four digits: UTC month-day, UTC time, local month-day, local time.
static DATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d{4}\s+\d{4}\s+\d{4}\s+\d{4}\b").expect("data line pattern is valid")
});

/// Tokens per data line: four date groups plus seven weather fields.
const MIN_FIELDS: usize = 11;

const PORT_NAME_LABEL: &str = "PORT NAME";
const STATION_LABEL: &str = "STATION ID";
const ISSUED_LABEL: &str = "ISSUED";
const UNKNOWN_PORT: &str = "Unknown";

/// Output of a successful parse.
#[derive(Debug, Clone)]
pub struct ParsedBulletin {
    pub port_name: String,
    pub station_id: Option<String>,
    pub issued_label: Option<String>,
    pub records: Vec<BulletinRecord>,
    pub warnings: Vec<String>,
}

impl ParsedBulletin {
    /// Attach port identity and raw text.
    pub fn into_bulletin(
        self,
        port_code: impl Into<String>,
        station_id: impl Into<String>,
        issued_label: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Bulletin {
        Bulletin {
            port_code: port_code.into(),
            port_name: self.port_name,
            station_id: station_id.into(),
            issued_label: issued_label.into(),
            records: self.records,
            warnings: self.warnings,
            raw_text: raw_text.into(),
        }
    }
}

/// Parser for port forecast bulletins.
#[derive(Debug, Clone)]
pub struct BulletinParser {
    base_year: i32,
}

impl BulletinParser {
    /// Create a parser whose year counter starts at the current UTC year.
    pub fn new() -> Self {
        Self::with_base_year(Utc::now().year())
    }

    /// Create a parser whose year counter starts at `base_year`.
    pub fn with_base_year(base_year: i32) -> Self {
        Self { base_year }
    }

    /// Lazily iterate the data section in source order.
    ///
    /// Fails only when the wind/wave header is missing.
    pub fn records<'a>(&self, text: &'a str) -> Result<Records<'a>> {
        let header = text
            .lines()
            .position(is_header)
            .ok_or_else(|| AppError::parse("missing data section"))?;

        let mut lines = text.lines();
        // Data begins two lines after the header (the column-label row sits between).
        for _ in 0..header + 2 {
            lines.next();
        }

        Ok(Records {
            lines,
            line_no: header + 2,
            year: self.base_year,
            prev_month_day: None,
            finished: false,
        })
    }

    /// Parse a whole bulletin.
    pub fn parse(&self, text: &str) -> Result<ParsedBulletin> {
        let mut records = Vec::new();
        let mut warnings = Vec::new();

        for item in self.records(text)? {
            match item {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::debug!("Skipping malformed bulletin line: {}", e);
                    warnings.push(e.to_string());
                }
            }
        }

        if records.is_empty() {
            return Err(AppError::parse(format!(
                "no valid records ({} malformed line(s))",
                warnings.len()
            )));
        }

        Ok(ParsedBulletin {
            port_name: extract_port_name(text).unwrap_or_else(|| UNKNOWN_PORT.to_string()),
            station_id: extract_station_id(text),
            issued_label: extract_issued_label(text),
            records,
            warnings,
        })
    }
}

impl Default for BulletinParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the data section of a bulletin.
///
/// Yields one item per data line until a separator line or end of text.
pub struct Records<'a> {
    lines: Lines<'a>,
    /// 0-based index of the next line
    line_no: usize,
    year: i32,
    prev_month_day: Option<&'a str>,
    finished: bool,
}

impl<'a> Iterator for Records<'a> {
    type Item = std::result::Result<BulletinRecord, FieldParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        while let Some(line) = self.lines.next() {
            self.line_no += 1;
            if DATA_LINE.is_match(line) {
                return Some(self.parse_line(self.line_no, line));
            }
            if is_terminator(line) {
                break;
            }
        }
        self.finished = true;
        None
    }
}

impl<'a> Records<'a> {
    fn parse_line(
        &mut self,
        line_no: usize,
        line: &'a str,
    ) -> std::result::Result<BulletinRecord, FieldParseError> {
        let fields: Vec<&'a str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            return Err(FieldParseError::new(
                line_no,
                format!(
                    "expected {} fields, found {}",
                    MIN_FIELDS,
                    fields.len()
                ),
            ));
        }

        let month_day = fields[0];
        let time = fields[1];
        self.advance_year(month_day);
        let timestamp = assemble_timestamp(self.year, month_day, time)
            .ok_or_else(|| {
                FieldParseError::new(
                    line_no,
                    format!("invalid UTC date/time '{} {}'", month_day, time),
                )
            })?;

        Ok(BulletinRecord {
            timestamp,
            wind_direction: fields[4].to_uppercase(),
            wind_speed: parse_number(line_no, "wind speed", fields[5])?,
            wind_gust: parse_number(line_no, "wind gust", fields[6])?,
            wave_direction: fields[7].to_uppercase(),
            wave_height: parse_number(line_no, "wave height", fields[8])?,
            wave_max: parse_number(line_no, "max wave height", fields[9])?,
            wave_period: parse_number(line_no, "wave period", fields[10])?,
        })
    }

    /// Bump the year on a December to January transition.
    fn advance_year(&mut self, month_day: &'a str) {
        if let Some(prev) = self.prev_month_day {
            if month_day < prev && prev.starts_with("12") && month_day.starts_with("01") {
                self.year += 1;
            }
        }
        self.prev_month_day = Some(month_day);
    }
}

fn is_header(line: &str) -> bool {
    let upper = line.to_ascii_uppercase();
    upper.contains("WIND") && upper.contains("WAVE")
}

fn is_terminator(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("**") || trimmed.starts_with("==") || trimmed.starts_with("--")
}

fn assemble_timestamp(year: i32, month_day: &str, time: &str) -> Option<NaiveDateTime> {
    let month: u32 = month_day.get(0..2)?.parse().ok()?;
    let day: u32 = month_day.get(2..4)?.parse().ok()?;
    let hour: u32 = time.get(0..2)?.parse().ok()?;
    let minute: u32 = time.get(2..4)?.parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(NaiveDateTime::new(date, time))
}

/// Strip `*` markers and convert; a cleared token reads as zero.
fn parse_number(
    line_no: usize,
    field: &str,
    token: &str,
) -> std::result::Result<f64, FieldParseError> {
    let cleaned = token.replace('*', "");
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = cleaned.parse().map_err(|_| {
        FieldParseError::new(line_no, format!("{} '{}' is not a number", field, token))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(FieldParseError::new(
            line_no,
            format!("{} '{}' is out of range", field, token),
        ));
    }
    Ok(value)
}

/// Value of the first line containing `label`, taken after the next `:`.
fn label_value(text: &str, label: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let pos = line.to_ascii_uppercase().find(label)?;
        let rest = &line[pos + label.len()..];
        let value = match rest.split_once(':') {
            Some((_, value)) => value,
            None => rest,
        };
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Port name from the `PORT NAME` line, if any.
pub fn extract_port_name(text: &str) -> Option<String> {
    label_value(text, PORT_NAME_LABEL)
}

/// Issued-time label as printed by the source, if any.
pub fn extract_issued_label(text: &str) -> Option<String> {
    label_value(text, ISSUED_LABEL)
}

/// Station identifier as printed by the source, if any.
pub fn extract_station_id(text: &str) -> Option<String> {
    label_value(text, STATION_LABEL)
}
