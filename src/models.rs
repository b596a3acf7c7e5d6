use crate::error::RecordError;
use crate::format::format_pace;
use chrono::{NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calories burned per minute of running, as a flat linear estimate.
pub const CALORIES_PER_MINUTE: f64 = 12.0;

/// Strava activity as returned by the API.
///
/// `distance` and `moving_time` stay untyped: depending on the client and
/// API version they arrive as bare numbers or as unit objects, and the
/// normalizer decides which shape it is looking at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawActivity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport_type: Option<String>,
    #[serde(default)]
    pub start_date_local: String,
    #[serde(default)]
    pub distance: serde_json::Value,
    #[serde(default)]
    pub moving_time: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed: Option<f64>, // meters per second
}

impl RawActivity {
    /// Check if this activity is a run
    pub fn is_run(&self) -> bool {
        let is = |v: &Option<String>, want: &str| v.as_deref() == Some(want);
        is(&self.activity_type, "Run")
            || is(&self.sport_type, "Run")
            || is(&self.sport_type, "TrailRun")
            || is(&self.sport_type, "VirtualRun")
    }
}

/// Activity converted to canonical kilometers and minutes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedActivity {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    /// Kilometers, rounded to 2 decimal places
    pub distance_km: f64,
    /// Whole minutes, truncated
    pub duration_min: u32,
    pub average_speed: Option<f64>,
    pub sport_type: Option<String>,
}

/// How the run felt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Feeling {
    Great,
    #[default]
    Good,
    Okay,
    Tired,
    Bad,
}

impl fmt::Display for Feeling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Feeling::Great => "Great",
            Feeling::Good => "Good",
            Feeling::Okay => "Okay",
            Feeling::Tired => "Tired",
            Feeling::Bad => "Bad",
        };
        f.write_str(s)
    }
}

impl FromStr for Feeling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "great" => Ok(Feeling::Great),
            "good" => Ok(Feeling::Good),
            "okay" | "ok" => Ok(Feeling::Okay),
            "tired" => Ok(Feeling::Tired),
            "bad" => Ok(Feeling::Bad),
            other => Err(format!(
                "Unknown feeling '{}'. Expected one of: great, good, okay, tired, bad",
                other
            )),
        }
    }
}

/// Where a run record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    Manual,
    Strava,
    Gps,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Manual => "Manual",
            Source::Strava => "Strava",
            Source::Gps => "GPS",
        };
        f.write_str(s)
    }
}

/// One row of the running log. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub date: NaiveDate,
    pub distance_km: f64,
    pub duration_min: f64,
    pub pace: String,
    pub calorie_estimate: u32,
    pub feeling: Feeling,
    pub source: Source,
    /// Strava activity ID for records accepted from Strava
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<i64>,
}

impl RunRecord {
    /// Build a record, deriving pace and calories.
    pub fn new(
        date: NaiveDate,
        distance_km: f64,
        duration_min: f64,
        feeling: Feeling,
        source: Source,
    ) -> Result<Self, RecordError> {
        check_quantity("distance_km", distance_km)?;
        check_quantity("duration_min", duration_min)?;
        // Keeps a "0:00" pace reserved for zero distance
        if distance_km > 0.0 && duration_min == 0.0 {
            return Err(RecordError::ZeroDuration { distance_km });
        }

        Ok(Self {
            date,
            distance_km,
            duration_min,
            pace: format_pace(distance_km, duration_min),
            calorie_estimate: (duration_min * CALORIES_PER_MINUTE).floor() as u32,
            feeling,
            source,
            activity_id: None,
        })
    }

    /// Build a record from an accepted Strava activity.
    pub fn from_activity(activity: &NormalizedActivity, feeling: Feeling) -> Result<Self, RecordError> {
        let mut record = Self::new(
            activity.date,
            activity.distance_km,
            f64::from(activity.duration_min),
            feeling,
            Source::Strava,
        )?;
        record.activity_id = Some(activity.id);
        Ok(record)
    }
}

fn check_quantity(field: &'static str, value: f64) -> Result<(), RecordError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RecordError::InvalidQuantity { field, value })
    }
}

/// Cached OAuth token with expiration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64, // Unix timestamp
}

impl TokenCache {
    /// Check if the token is expiring within the given buffer (in seconds)
    pub fn is_expiring_soon(&self, buffer_seconds: i64) -> bool {
        let now = Utc::now().timestamp();
        now + buffer_seconds >= self.expires_at
    }

    /// Check if the token is already expired
    pub fn is_expired(&self) -> bool {
        self.is_expiring_soon(0)
    }
}

impl From<TokenResponse> for TokenCache {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_at,
        }
    }
}

/// OAuth token response from Strava
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}
