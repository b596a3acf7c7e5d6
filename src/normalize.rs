//! Activity normalization.
//!
//! Strava activities reach us with `distance` and `moving_time` in whatever
//! shape the producing client used: a bare number, a unit object with a
//! `meters`/`magnitude` (or `total_seconds`/`seconds`) accessor, or a
//! human-readable string. Each shape is a strategy; strategies are tried in
//! a fixed order and the first match wins. If none match the value is
//! rejected with [`NormalizeError::UnrecognizedUnitFormat`], never read as 0.

use crate::error::NormalizeError;
use crate::models::{NormalizedActivity, RawActivity};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::fmt::Debug;

/// A way of reading one quantity out of an untyped activity field.
trait Strategy: Copy + Debug {
    /// Field name used in errors and logs
    const FIELD: &'static str;

    /// The quantity in base units (meters or seconds), if this strategy
    /// recognizes the shape.
    fn extract(self, value: &Value) -> Option<f64>;
}

/// Distance shapes, read as meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceShape {
    /// `{"meters": 5000}`
    Meters,
    /// `{"magnitude": 5000}`, optionally with `"units"`
    Magnitude,
    /// `5000`
    Raw,
    /// `"5000 m"`, `"5 km"`
    UnitString,
}

/// Precedence order for distance extraction.
pub const DISTANCE_STRATEGIES: [DistanceShape; 4] = [
    DistanceShape::Meters,
    DistanceShape::Magnitude,
    DistanceShape::Raw,
    DistanceShape::UnitString,
];

impl Strategy for DistanceShape {
    const FIELD: &'static str = "distance";

    fn extract(self, value: &Value) -> Option<f64> {
        match self {
            DistanceShape::Meters => value.get("meters")?.as_f64(),
            DistanceShape::Magnitude => {
                let magnitude = value.get("magnitude")?.as_f64()?;
                let unit = value
                    .get("units")
                    .or_else(|| value.get("unit"))
                    .and_then(Value::as_str)
                    .unwrap_or("m");
                Some(magnitude * meters_per_unit(unit)?)
            }
            DistanceShape::Raw => value.as_f64(),
            DistanceShape::UnitString => parse_distance_string(value.as_str()?),
        }
    }
}

/// Duration shapes, read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationShape {
    /// `{"total_seconds": 1800}`
    TotalSeconds,
    /// `{"seconds": 1800}`, plus `"days"` when present
    Seconds,
    /// `1800`
    Raw,
    /// `"0:30:00"`, `"30:00"`
    Clock,
}

/// Precedence order for duration extraction.
pub const DURATION_STRATEGIES: [DurationShape; 4] = [
    DurationShape::TotalSeconds,
    DurationShape::Seconds,
    DurationShape::Raw,
    DurationShape::Clock,
];

impl Strategy for DurationShape {
    const FIELD: &'static str = "moving_time";

    fn extract(self, value: &Value) -> Option<f64> {
        match self {
            DurationShape::TotalSeconds => value.get("total_seconds")?.as_f64(),
            DurationShape::Seconds => {
                let seconds = value.get("seconds")?.as_f64()?;
                let days = value.get("days").and_then(Value::as_f64).unwrap_or(0.0);
                Some(days * 86_400.0 + seconds)
            }
            DurationShape::Raw => value.as_f64(),
            DurationShape::Clock => parse_clock(value.as_str()?),
        }
    }
}

fn first_match<S: Strategy>(strategies: &[S], value: &Value) -> Result<f64, NormalizeError> {
    for &strategy in strategies {
        if let Some(found) = strategy.extract(value) {
            if !found.is_finite() || found < 0.0 {
                return Err(NormalizeError::NegativeQuantity {
                    field: S::FIELD,
                    value: found,
                });
            }
            tracing::trace!(field = S::FIELD, ?strategy, value = found, "Unit shape matched");
            return Ok(found);
        }
    }

    Err(NormalizeError::UnrecognizedUnitFormat {
        field: S::FIELD,
        found: describe(value),
    })
}

/// Distance in kilometers, rounded to 2 decimal places.
pub fn extract_distance_km(value: &Value) -> Result<f64, NormalizeError> {
    let meters = first_match(&DISTANCE_STRATEGIES, value)?;
    Ok(meters_to_km(meters))
}

/// Duration in whole minutes, truncated.
pub fn extract_duration_min(value: &Value) -> Result<u32, NormalizeError> {
    let seconds = first_match(&DURATION_STRATEGIES, value)?;
    seconds_to_min(seconds)
}

/// Convert a Strava activity into canonical kilometers and minutes.
pub fn normalize_activity(activity: &RawActivity) -> Result<NormalizedActivity, NormalizeError> {
    Ok(NormalizedActivity {
        id: activity.id,
        name: activity.name.clone(),
        date: parse_activity_date(&activity.start_date_local)?,
        distance_km: extract_distance_km(&activity.distance)?,
        duration_min: extract_duration_min(&activity.moving_time)?,
        average_speed: activity.average_speed,
        sport_type: activity
            .sport_type
            .clone()
            .or_else(|| activity.activity_type.clone()),
    })
}

pub(crate) fn meters_to_km(meters: f64) -> f64 {
    (meters / 10.0).round() / 100.0
}

pub(crate) fn seconds_to_min(seconds: f64) -> Result<u32, NormalizeError> {
    let minutes = (seconds / 60.0).trunc();
    if minutes > f64::from(u32::MAX) {
        return Err(NormalizeError::OutOfRange {
            field: DurationShape::FIELD,
            value: seconds,
        });
    }
    Ok(minutes as u32)
}

/// Calendar date of `start_date_local`.
///
/// Strava stamps local times with a `Z` suffix, so RFC 3339 input is taken at
/// face value rather than shifted to another zone.
pub fn parse_activity_date(raw: &str) -> Result<NaiveDate, NormalizeError> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| NormalizeError::InvalidDate(raw.to_string()))
}

fn meters_per_unit(unit: &str) -> Option<f64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "" | "m" | "meter" | "meters" | "metre" | "metres" => Some(1.0),
        "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => Some(1000.0),
        "mi" | "mile" | "miles" => Some(1609.344),
        _ => None,
    }
}

fn parse_distance_string(s: &str) -> Option<f64> {
    let s = s.trim();
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number = number.trim();
    if number.is_empty() {
        return None;
    }
    let magnitude: f64 = number.parse().ok()?;
    Some(magnitude * meters_per_unit(unit)?)
}

fn parse_clock(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return None;
        }
        let n: f64 = part.parse().ok()?;
        if i > 0 && n >= 60.0 {
            return None;
        }
        total = total * 60.0 + n;
    }
    Some(total)
}

fn describe(value: &Value) -> String {
    const MAX: usize = 80;
    let text = value.to_string();
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        text
    }
}
