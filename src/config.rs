//! Configuration loaded from environment variables (and `.env` if present).

use crate::error::ConfigError;
use std::env;
use url::Url;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost/exchange_token";
pub const DEFAULT_API_BASE: &str = "https://www.strava.com";

/// Strava OAuth configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strava OAuth client ID (public)
    pub client_id: String,
    /// Strava OAuth client secret
    pub client_secret: String,
    /// Fixed redirect URI registered with the Strava application
    pub redirect_uri: String,
    /// Base URL for OAuth and REST calls
    pub api_base: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            client_id: "12345".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Load config from environment variables and validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            client_id: env::var("STRAVA_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            redirect_uri: env::var("STRAVA_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),
            api_base: env::var("STRAVA_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check credentials and redirect URI before they reach Strava.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.client_id.parse::<u64>() {
            Ok(id) if id > 0 => {}
            _ => return Err(ConfigError::InvalidClientId(self.client_id.clone())),
        }

        if self.client_secret.is_empty() || self.client_secret.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidClientSecret);
        }

        let uri = Url::parse(&self.redirect_uri).map_err(|e| ConfigError::InvalidRedirectUri {
            uri: self.redirect_uri.clone(),
            reason: e.to_string(),
        })?;
        if uri.scheme() != "http" && uri.scheme() != "https" {
            return Err(ConfigError::InvalidRedirectUri {
                uri: self.redirect_uri.clone(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        Url::parse(&self.api_base).map_err(|e| ConfigError::InvalidApiBase {
            uri: self.api_base.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Port of a `http://localhost:<port>/...` redirect URI, used by the
    /// callback listener. `None` when the redirect goes elsewhere.
    pub fn callback_port(&self) -> Option<u16> {
        let uri = Url::parse(&self.redirect_uri).ok()?;
        match uri.host_str() {
            Some("localhost") | Some("127.0.0.1") if uri.scheme() == "http" => uri.port(),
            _ => None,
        }
    }
}
