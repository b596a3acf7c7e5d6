use crate::error::StravaError;
use crate::models::{RawActivity, TokenResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Strava HTTP client for the OAuth token endpoint and activity listing.
#[derive(Clone)]
pub struct StravaClient {
    http: Client,
    base_url: String,
}

impl StravaClient {
    /// Create a client against `base_url` (normally `https://www.strava.com`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, StravaError> {
        let http = Client::builder().user_agent("runmaster/1.0").build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenResponse, StravaError> {
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        self.post_token(&params).await
    }

    /// Refresh an expiring access token
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, StravaError> {
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.post_token(&params).await
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, StravaError> {
        let url = format!("{}/oauth/token", self.base_url);
        let response = self.http.post(&url).form(params).send().await?;
        Self::read_json(response).await
    }

    /// Fetch the most recent activities for the authenticated athlete.
    ///
    /// Entries that are not even shaped like an activity (no `id`) are
    /// skipped with a warning; unit fields are left for the normalizer.
    pub async fn fetch_activities(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<Vec<RawActivity>, StravaError> {
        let url = format!("{}/api/v3/athlete/activities", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("per_page", limit.to_string()), ("page", "1".to_string())])
            .bearer_auth(access_token)
            .send()
            .await?;

        let entries: Vec<serde_json::Value> = Self::read_json(response).await?;
        let activities: Vec<RawActivity> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(activity) => Some(activity),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed activity");
                    None
                }
            })
            .take(limit as usize)
            .collect();

        tracing::info!(count = activities.len(), "Fetched Strava activities");
        Ok(activities)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StravaError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StravaError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| StravaError::Decode(e.to_string()))
    }
}
