// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ISO-8601 timer specifications.
//!
//! Three accepted shapes:
//! - `PT5S`, `P1DT2H` … relative durations
//! - `2026-03-01T12:00:00Z` … RFC-3339 absolute dates
//! - `R3/PT1S`, `R/PT1M` … repetition cycles (no count = infinite)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeSpecError {
    #[error("empty timer specification")]
    Empty,
    #[error("invalid duration {spec:?}: {reason}")]
    InvalidDuration { spec: String, reason: String },
    #[error("invalid date {spec:?}: {reason}")]
    InvalidDate { spec: String, reason: String },
    #[error("invalid cycle {spec:?}: {reason}")]
    InvalidCycle { spec: String, reason: String },
}

/// A parsed timer specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSpec {
    /// Relative delay.
    Duration(Duration),
    /// Absolute deadline in epoch milliseconds.
    Date(u64),
    /// Repeating interval; `repetitions = None` repeats forever.
    Cycle {
        repetitions: Option<u32>,
        interval: Duration,
    },
}

impl TimeSpec {
    /// Parse any of the three accepted shapes.
    pub fn parse(spec: &str) -> Result<TimeSpec, TimeSpecError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(TimeSpecError::Empty);
        }
        if let Some(rest) = spec.strip_prefix('R') {
            return parse_cycle(spec, rest);
        }
        if spec.starts_with('P') {
            return Ok(TimeSpec::Duration(parse_iso_duration(spec)?));
        }
        parse_date(spec)
    }

    /// Absolute deadline for this spec relative to `now_ms`.
    pub fn fires_at_ms(&self, now_ms: u64) -> u64 {
        match self {
            TimeSpec::Duration(d) => now_ms + d.as_millis() as u64,
            TimeSpec::Date(at) => *at,
            TimeSpec::Cycle { interval, .. } => now_ms + interval.as_millis() as u64,
        }
    }
}

fn parse_cycle(spec: &str, rest: &str) -> Result<TimeSpec, TimeSpecError> {
    let Some((count_str, duration_str)) = rest.split_once('/') else {
        return Err(TimeSpecError::InvalidCycle {
            spec: spec.to_string(),
            reason: "missing '/' separator".to_string(),
        });
    };
    let repetitions = if count_str.is_empty() {
        None
    } else {
        Some(count_str.parse::<u32>().map_err(|e| TimeSpecError::InvalidCycle {
            spec: spec.to_string(),
            reason: format!("bad repetition count: {e}"),
        })?)
    };
    if repetitions == Some(0) {
        return Err(TimeSpecError::InvalidCycle {
            spec: spec.to_string(),
            reason: "repetition count must be positive".to_string(),
        });
    }
    let interval = parse_iso_duration(duration_str)?;
    if interval.is_zero() {
        return Err(TimeSpecError::InvalidCycle {
            spec: spec.to_string(),
            reason: "zero interval".to_string(),
        });
    }
    Ok(TimeSpec::Cycle { repetitions, interval })
}

fn parse_date(spec: &str) -> Result<TimeSpec, TimeSpecError> {
    let parsed = chrono::DateTime::parse_from_rfc3339(spec).map_err(|e| {
        TimeSpecError::InvalidDate { spec: spec.to_string(), reason: e.to_string() }
    })?;
    let ms = parsed.timestamp_millis();
    Ok(TimeSpec::Date(ms.max(0) as u64))
}

/// Parse an ISO-8601 duration (`PnYnMnWnDTnHnMnS`).
///
/// Calendar units use fixed approximations: a year is 365 days, a month 30.
/// Seconds may carry a fractional part.
pub fn parse_iso_duration(spec: &str) -> Result<Duration, TimeSpecError> {
    let err = |reason: &str| TimeSpecError::InvalidDuration {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let Some(body) = spec.strip_prefix('P') else {
        return Err(err("must start with 'P'"));
    };
    if body.is_empty() {
        return Err(err("no components"));
    }

    let mut total_ms: u64 = 0;
    let mut in_time = false;
    let mut saw_component = false;
    let mut number = String::new();

    for ch in body.chars() {
        match ch {
            'T' | 't' => {
                if in_time {
                    return Err(err("duplicate 'T'"));
                }
                if !number.is_empty() {
                    return Err(err("dangling number before 'T'"));
                }
                in_time = true;
            }
            '0'..='9' | '.' => number.push(ch),
            unit => {
                if number.is_empty() {
                    return Err(err("unit without a number"));
                }
                let value: f64 = number.parse().map_err(|_| err("bad number"))?;
                number.clear();
                saw_component = true;
                let ms_per_unit: u64 = match (unit.to_ascii_uppercase(), in_time) {
                    ('Y', false) => 365 * 24 * 3_600_000,
                    ('M', false) => 30 * 24 * 3_600_000,
                    ('W', false) => 7 * 24 * 3_600_000,
                    ('D', false) => 24 * 3_600_000,
                    ('H', true) => 3_600_000,
                    ('M', true) => 60_000,
                    ('S', true) => 1_000,
                    _ => return Err(err("unknown unit")),
                };
                total_ms += (value * ms_per_unit as f64) as u64;
            }
        }
    }

    if !number.is_empty() {
        return Err(err("dangling number"));
    }
    if !saw_component {
        return Err(err("no components"));
    }
    Ok(Duration::from_millis(total_ms))
}

#[cfg(test)]
#[path = "timespec_tests.rs"]
mod tests;
