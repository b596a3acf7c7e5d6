use crate::config::Config;
use crate::error::{ConfigError, StravaError};
use crate::models::TokenCache;
use crate::strava::StravaClient;
use axum::{
    extract::Query,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

const TOKEN_REFRESH_BUFFER: i64 = 300; // 5 minutes in seconds

/// Scopes requested from Strava, comma separated as Strava expects.
pub const SCOPES: &str = "read_all,activity:read_all";

/// How long the localhost callback listener waits for the browser.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the Strava authorization link for the configured fixed redirect URI.
pub fn authorization_url(config: &Config) -> Result<Url, ConfigError> {
    config.validate()?;

    let raw = format!("{}/oauth/authorize", config.api_base);
    let mut auth_url = Url::parse(&raw).map_err(|e| ConfigError::InvalidApiBase {
        uri: config.api_base.clone(),
        reason: e.to_string(),
    })?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("approval_prompt", "auto")
        .append_pair("scope", SCOPES);

    Ok(auth_url)
}

/// Pull the authorization code out of what the user pasted: either the bare
/// code or the whole redirect URL containing `code=...`.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(input) {
        return url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
    }

    if let Some(start) = input.find("code=") {
        let rest = &input[start + "code=".len()..];
        let code = rest.split('&').next().unwrap_or_default();
        return (!code.is_empty()).then(|| code.to_string());
    }

    if input.chars().any(char::is_whitespace) {
        return None;
    }
    Some(input.to_string())
}

/// Exchanges codes and keeps the session's token fresh. Tokens live only in
/// the session; nothing is written to disk.
pub struct TokenManager {
    config: Config,
    client: StravaClient,
}

impl TokenManager {
    pub fn new(config: Config, client: StravaClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &StravaClient {
        &self.client
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<TokenCache, StravaError> {
        let response = self
            .client
            .exchange_code(&self.config.client_id, &self.config.client_secret, code)
            .await?;
        tracing::info!(expires_at = response.expires_at, "Exchanged authorization code");
        Ok(response.into())
    }

    /// Return a token that is good for at least the refresh buffer, refreshing
    /// `current` if it is about to expire. The caller stores the result; no
    /// session lock is needed while Strava is contacted.
    pub async fn fresh_token(&self, current: Option<TokenCache>) -> Result<TokenCache, StravaError> {
        let token = current.ok_or(StravaError::NotConnected)?;

        if !token.is_expiring_soon(TOKEN_REFRESH_BUFFER) {
            return Ok(token);
        }

        tracing::info!(expires_at = token.expires_at, "Refreshing Strava access token");
        let response = self
            .client
            .refresh_token(
                &self.config.client_id,
                &self.config.client_secret,
                &token.refresh_token,
            )
            .await?;
        Ok(response.into())
    }
}

/// Wait for Strava to redirect the browser to `http://localhost:<port><path>`
/// and return the authorization code.
pub async fn listen_for_code(port: u16, path: &str, timeout: Duration) -> Result<String, StravaError> {
    let callback_result: Arc<Mutex<Option<Result<String, String>>>> = Arc::new(Mutex::new(None));
    let callback_result_clone = callback_result.clone();

    let app = Router::new().route(
        path,
        get(move |query: Query<CallbackParams>| callback_handler(query, callback_result_clone.clone())),
    );

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| StravaError::Callback(format!("failed to bind port {}: {}", port, e)))?;

    tracing::info!(port, path, "Waiting for authorization callback");

    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    let start = tokio::time::Instant::now();
    let outcome = loop {
        if start.elapsed() >= timeout {
            break Err(StravaError::Callback(format!(
                "timed out after {} seconds",
                timeout.as_secs()
            )));
        }

        if let Some(result) = callback_result.lock().await.take() {
            break result.map_err(StravaError::Callback);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    server_handle.abort();
    outcome
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

async fn callback_handler(
    Query(params): Query<CallbackParams>,
    result: Arc<Mutex<Option<Result<String, String>>>>,
) -> impl IntoResponse {
    let (outcome, page) = match (params.code, params.error) {
        (_, Some(error)) => (
            Err(format!("authorization denied: {}", error)),
            "<h1>Authorization Failed</h1><p>Strava reported an error. You can close this window.</p>",
        ),
        (Some(code), None) if !code.is_empty() => (
            Ok(code),
            "<h1>Authorization Successful!</h1><p>You can close this window and return to your client.</p>",
        ),
        _ => (
            Err("no authorization code received".to_string()),
            "<h1>Authorization Failed</h1><p>No authorization code received.</p>",
        ),
    };

    *result.lock().await = Some(outcome);
    Html(format!("<html><body>{}</body></html>", page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_authorization_url_parameters() {
        let url = authorization_url(&Config::default()).unwrap();
        assert_eq!(url.host_str(), Some("www.strava.com"));
        assert_eq!(url.path(), "/oauth/authorize");

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params.len(), 5);
        assert_eq!(params["client_id"], "12345");
        assert_eq!(params["redirect_uri"], "http://localhost/exchange_token");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["approval_prompt"], "auto");
        assert_eq!(params["scope"], "read_all,activity:read_all");
    }

    #[test]
    fn test_authorization_url_rejects_bad_credentials() {
        let config = Config {
            client_id: "my-app".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            authorization_url(&config),
            Err(ConfigError::InvalidClientId(_))
        ));
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(extract_code("abc123"), Some("abc123".to_string()));
        assert_eq!(extract_code("  abc123\n"), Some("abc123".to_string()));
        assert_eq!(
            extract_code("http://localhost/exchange_token?state=&code=xyz789&scope=read,activity:read_all"),
            Some("xyz789".to_string())
        );
        assert_eq!(
            extract_code("code=xyz789&scope=read"),
            Some("xyz789".to_string())
        );
        assert_eq!(extract_code("http://localhost/exchange_token?error=access_denied"), None);
        assert_eq!(extract_code(""), None);
        assert_eq!(extract_code("two words"), None);
    }

    #[tokio::test]
    async fn test_fresh_token_requires_connection() {
        let client = StravaClient::new("http://127.0.0.1:9").unwrap();
        let manager = TokenManager::new(Config::default(), client);
        assert!(matches!(
            manager.fresh_token(None).await,
            Err(StravaError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_fresh_token_is_returned_unchanged() {
        let client = StravaClient::new("http://127.0.0.1:9").unwrap();
        let manager = TokenManager::new(Config::default(), client);
        let token = TokenCache {
            access_token: "fresh".to_string(),
            refresh_token: "r".to_string(),
            expires_at: chrono::Utc::now().timestamp() + 3600,
        };
        assert_eq!(manager.fresh_token(Some(token.clone())).await.unwrap(), token);
    }

    #[tokio::test]
    async fn test_listen_for_code_times_out() {
        let result = listen_for_code(0, "/callback", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(StravaError::Callback(msg)) if msg.contains("timed out")));
    }
}
