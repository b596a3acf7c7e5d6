//! Error types for the running log.
//!
//! Each layer gets its own enum so callers can tell a user mistake (bad
//! input, unknown activity) apart from an infrastructure failure (network,
//! Strava API).

/// Configuration errors, surfaced to the user instead of being swallowed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid Strava client ID '{0}': expected a positive integer")]
    InvalidClientId(String),

    #[error("Invalid Strava client secret: must be non-empty and contain no whitespace")]
    InvalidClientSecret,

    #[error("Invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri { uri: String, reason: String },

    #[error("Invalid Strava API base URL '{uri}': {reason}")]
    InvalidApiBase { uri: String, reason: String },
}

/// Strava token exchange and API errors.
#[derive(Debug, thiserror::Error)]
pub enum StravaError {
    #[error("HTTP request to Strava failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Strava API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode Strava response: {0}")]
    Decode(String),

    #[error("Not connected to Strava. Use authorization_url and connect_strava first.")]
    NotConnected,

    #[error("OAuth callback failed: {0}")]
    Callback(String),
}

impl StravaError {
    /// Whether the error came from Strava rejecting our credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, StravaError::Api { status, .. } if *status == 400 || *status == 401)
    }
}

/// Unit extraction failures in the activity normalizer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Unrecognized unit format for {field}: {found}")]
    UnrecognizedUnitFormat { field: &'static str, found: String },

    #[error("Invalid {field} value {value}: must be finite and non-negative")]
    NegativeQuantity { field: &'static str, value: f64 },

    #[error("Invalid {field} value {value}: too large")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Invalid activity date '{0}'")]
    InvalidDate(String),
}

/// Rejected run record construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid {field} {value}: must be finite and non-negative")]
    InvalidQuantity { field: &'static str, value: f64 },

    #[error("A run of {distance_km} km needs a duration of at least one minute")]
    ZeroDuration { distance_km: f64 },
}

/// GPX import errors.
#[derive(Debug, thiserror::Error)]
pub enum GpxError {
    #[error("Failed to read GPX file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse GPX file: {0}")]
    Parse(String),

    #[error("GPX file contains no track points")]
    Empty,
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Activity {0} was not fetched in this session")]
    UnknownActivity(i64),

    #[error("Activity {0} is already in the log")]
    AlreadyAdded(i64),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Gpx(#[from] GpxError),
}
