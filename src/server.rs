//! MCP server: each tool is one user action on the running log.

use crate::config::Config;
use crate::dashboard::{chart_series, render_chart, render_summary, render_table, Summary};
use crate::error::{ConfigError, SessionError, StravaError};
use crate::format::{format_km, format_minutes, format_pace, format_speed_pace};
use crate::gpx_import::parse_gpx_file;
use crate::models::{Feeling, NormalizedActivity, RawActivity, RunRecord};
use crate::normalize::normalize_activity;
use crate::oauth::{authorization_url, extract_code, listen_for_code, TokenManager, CALLBACK_TIMEOUT};
use crate::session::Session;
use crate::strava::StravaClient;
use chrono::{Duration, Local, NaiveDate};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct RunMasterServer {
    tokens: Arc<TokenManager>,
    session: Arc<Mutex<Session>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RunMasterServer {
    pub fn new(config: Config) -> Result<Self, StravaError> {
        let client = StravaClient::new(config.api_base.clone())?;
        Ok(Self {
            tokens: Arc::new(TokenManager::new(config, client)),
            session: Arc::new(Mutex::new(Session::new())),
            tool_router: Self::tool_router(),
        })
    }

    /// Tear down the session when the connection goes away.
    pub async fn shutdown(&self) {
        self.session.lock().await.end();
    }

    #[tool(description = "Get the Strava authorization link. After approving, copy the 'code' parameter from the redirect URL and pass it to connect_strava.")]
    async fn authorization_url(
        &self,
        params: Parameters<AuthorizationUrlParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let url = authorization_url(self.tokens.config()).map_err(config_error)?;

        if params.open_browser.unwrap_or(false) {
            if let Err(e) = open::that(url.as_str()) {
                tracing::warn!(error = %e, "Failed to open browser");
            }
        }

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Open this link and approve access:\n\n{}\n\nThen copy the `code=...` value from the address you are redirected to and call connect_strava with it.",
            url
        ))]))
    }

    #[tool(description = "Authorize in the browser and capture the code on a localhost redirect URI, then fetch recent activities")]
    async fn authorize(
        &self,
        params: Parameters<FetchParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = check_limit(params.0.limit)?;
        let config = self.tokens.config();
        let url = authorization_url(config).map_err(config_error)?;

        let port = config.callback_port().ok_or_else(|| {
            McpError::invalid_params_no_data(format!(
                "Redirect URI {} is not http://localhost:<port>/...; use authorization_url and connect_strava instead",
                config.redirect_uri
            ))
        })?;
        let path = Url::parse(&config.redirect_uri)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());

        if let Err(e) = open::that(url.as_str()) {
            tracing::warn!(error = %e, url = %url, "Failed to open browser; open the URL manually");
        }

        let code = listen_for_code(port, &path, CALLBACK_TIMEOUT)
            .await
            .map_err(strava_error)?;
        self.connect(&code, limit).await
    }

    #[tool(description = "Exchange the authorization code (or the whole redirect URL) for a token and list recent activities")]
    async fn connect_strava(
        &self,
        params: Parameters<ConnectParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let limit = check_limit(params.limit)?;
        let code = extract_code(&params.code).ok_or_else(|| {
            McpError::invalid_params_no_data("No authorization code found in input")
        })?;
        self.connect(&code, limit).await
    }

    #[tool(description = "Fetch recent Strava activities again with the session token")]
    async fn fetch_activities(
        &self,
        params: Parameters<FetchParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = check_limit(params.0.limit)?;
        let current = self.session.lock().await.token().cloned();
        let token = self.tokens.fresh_token(current).await.map_err(strava_error)?;
        let fetched = self.load_activities(&token.access_token, limit).await;

        let mut session = self.session.lock().await;
        // Ended while the request was in flight
        if session.token().is_none() {
            return Err(strava_error(StravaError::NotConnected));
        }
        session.set_token(token);
        let (activities, listing) = fetched?;
        session.replace_fetched(activities);
        Ok(CallToolResult::success(vec![Content::text(listing)]))
    }

    #[tool(description = "Add one fetched Strava activity to the running log")]
    async fn accept_activity(
        &self,
        params: Parameters<AcceptParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let mut session = self.session.lock().await;
        let record = session
            .accept_activity(params.id, params.feeling.unwrap_or_default())
            .map_err(session_error)?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Added to the log:\n\n{}",
            render_record(record)
        ))]))
    }

    #[tool(description = "Add a run by hand (date in YYYY-MM-DD format)")]
    async fn add_manual_run(
        &self,
        params: Parameters<ManualRunParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let date = parse_date(&params.date)?;
        let mut session = self.session.lock().await;
        let record = session
            .add_manual(
                date,
                params.distance_km,
                params.duration_min,
                params.feeling.unwrap_or_default(),
            )
            .map_err(session_error)?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Added to the log:\n\n{}",
            render_record(record)
        ))]))
    }

    #[tool(description = "Import a GPX file as a run using its moving distance and moving time")]
    async fn import_gpx(
        &self,
        params: Parameters<ImportGpxParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let fallback_date = match params.date.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => Local::now().date_naive(),
        };

        let summary = parse_gpx_file(&params.path)
            .map_err(|e| session_error(SessionError::Gpx(e)))?;
        let points = summary.points.len();
        let bounds = track_bounds(&summary.points);

        let mut session = self.session.lock().await;
        let record = session
            .add_gpx(summary, fallback_date, params.feeling.unwrap_or_default())
            .map_err(session_error)?;

        let mut output = format!("Imported {}:\n\n{}", params.path.display(), render_record(record));
        output.push_str(&format!("- **Track Points:** {}\n", points));
        if let Some((min_lat, min_lon, max_lat, max_lon)) = bounds {
            output.push_str(&format!(
                "- **Bounds:** ({:.5}, {:.5}) to ({:.5}, {:.5})\n",
                min_lat, min_lon, max_lat, max_lon
            ));
        }
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    #[tool(description = "Show totals, distance per day and every run in the log")]
    async fn get_summary(&self) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        let records = session.log().records();
        Ok(CallToolResult::success(vec![Content::text(render_dashboard(records))]))
    }

    #[tool(description = "End the session: forget the Strava token, fetched activities and all logged runs")]
    async fn end_session(&self) -> Result<CallToolResult, McpError> {
        let mut session = self.session.lock().await;
        let runs = session.log().len();
        session.end();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Session ended. {} runs discarded.",
            runs
        ))]))
    }
}

impl RunMasterServer {
    async fn connect(&self, code: &str, limit: u32) -> Result<CallToolResult, McpError> {
        let token = self.tokens.exchange_code(code).await.map_err(strava_error)?;
        let fetched = self.load_activities(&token.access_token, limit).await;

        let mut session = self.session.lock().await;
        session.set_token(token);
        let (activities, listing) = fetched?;
        session.replace_fetched(activities);

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Connected to Strava.\n\n{}",
            listing
        ))]))
    }

    /// Fetch and normalize without touching the session, so the lock is never
    /// held across a Strava request.
    async fn load_activities(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<(Vec<NormalizedActivity>, String), McpError> {
        let raw = self
            .tokens
            .client()
            .fetch_activities(access_token, limit)
            .await
            .map_err(strava_error)?;
        Ok(normalize_batch(&raw))
    }
}

#[tool_handler]
impl ServerHandler for RunMasterServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Personal running log. Connect Strava (authorization_url, then connect_strava), accept fetched runs, add runs by hand or from GPX files, and view the summary. The log lives only as long as this session.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// Tool parameter structs
#[derive(Debug, Deserialize, JsonSchema)]
struct AuthorizationUrlParams {
    #[schemars(description = "Also open the link in the default browser (default: false)")]
    open_browser: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ConnectParams {
    #[schemars(description = "Authorization code, or the full redirect URL containing code=...")]
    code: String,
    #[schemars(description = "Number of recent activities to fetch (default: 5, max: 100)")]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FetchParams {
    #[schemars(description = "Number of recent activities to fetch (default: 5, max: 100)")]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AcceptParams {
    #[schemars(description = "Strava activity ID from the fetched list")]
    id: i64,
    #[schemars(description = "How the run felt: great, good, okay, tired or bad (default: good)")]
    feeling: Option<Feeling>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ManualRunParams {
    #[schemars(description = "Date in YYYY-MM-DD format")]
    date: String,
    #[schemars(description = "Distance in kilometers")]
    distance_km: f64,
    #[schemars(description = "Duration in minutes")]
    duration_min: f64,
    #[schemars(description = "How the run felt: great, good, okay, tired or bad (default: good)")]
    feeling: Option<Feeling>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ImportGpxParams {
    #[schemars(description = "Path to the GPX file")]
    path: PathBuf,
    #[schemars(description = "Date to use if the track has no timestamps (YYYY-MM-DD, default: today)")]
    date: Option<String>,
    #[schemars(description = "How the run felt: great, good, okay, tired or bad (default: good)")]
    feeling: Option<Feeling>,
}

fn check_limit(limit: Option<u32>) -> Result<u32, McpError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);

    if limit == 0 {
        return Err(McpError::invalid_params_no_data("limit must be greater than 0"));
    }
    if limit > MAX_LIMIT {
        return Err(McpError::invalid_params_no_data(format!(
            "limit cannot exceed {} (requested: {})",
            MAX_LIMIT, limit
        )));
    }
    Ok(limit)
}

fn parse_date(raw: &str) -> Result<NaiveDate, McpError> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        McpError::invalid_params_no_data(format!(
            "Invalid date format (expected YYYY-MM-DD): {}",
            e
        ))
    })?;

    // Allow today + 1 day for timezone differences
    let max_date = Local::now().date_naive() + Duration::days(1);
    if date > max_date {
        return Err(McpError::invalid_params_no_data(format!(
            "Date {} is in the future (max: {})",
            date, max_date
        )));
    }
    Ok(date)
}

/// Normalize fetched activities. Activities that fail normalization are
/// reported inline and left out of the accept list.
pub(crate) fn normalize_batch(raw: &[RawActivity]) -> (Vec<NormalizedActivity>, String) {
    if raw.is_empty() {
        return (Vec::new(), "No recent activities found.".to_string());
    }

    let mut accepted = Vec::with_capacity(raw.len());
    let mut output = format!("# {} Recent Activities\n\n", raw.len());

    for activity in raw {
        match normalize_activity(activity) {
            Ok(normalized) => {
                output.push_str(&format!(
                    "## {} ({}) [id {}]\n",
                    normalized.name, normalized.date, normalized.id
                ));
                if !activity.is_run() {
                    let kind = normalized.sport_type.as_deref().unwrap_or("Unknown");
                    output.push_str(&format!("- **Type:** {} (not a run)\n", kind));
                }
                output.push_str(&format!(
                    "- **Distance:** {} km\n",
                    format_km(normalized.distance_km)
                ));
                output.push_str(&format!("- **Duration:** {} min\n", normalized.duration_min));
                output.push_str(&format!(
                    "- **Pace:** {}/km\n",
                    format_pace(normalized.distance_km, f64::from(normalized.duration_min))
                ));
                if let Some(speed) = normalized.average_speed {
                    output.push_str(&format!(
                        "- **Average Speed:** {:.2} m/s ({}/km)\n",
                        speed,
                        format_speed_pace(speed)
                    ));
                }
                accepted.push(normalized);
            }
            Err(e) => {
                tracing::warn!(activity_id = activity.id, error = %e, "Activity could not be normalized");
                output.push_str(&format!("## {} [id {}]\n", activity.name, activity.id));
                output.push_str(&format!("- **Skipped:** {}\n", e));
            }
        }
        output.push('\n');
    }

    if !accepted.is_empty() {
        output.push_str("Use accept_activity with an id to add a run to the log.\n");
    }
    (accepted, output)
}

fn render_record(record: &RunRecord) -> String {
    let mut output = format!("## {} ({})\n", record.date, record.source);
    output.push_str(&format!("- **Distance:** {} km\n", format_km(record.distance_km)));
    output.push_str(&format!("- **Duration:** {}\n", format_minutes(record.duration_min)));
    output.push_str(&format!("- **Pace:** {}/km\n", record.pace));
    output.push_str(&format!("- **Calories:** {} kcal\n", record.calorie_estimate));
    output.push_str(&format!("- **Feeling:** {}\n", record.feeling));
    output
}

pub(crate) fn render_dashboard(records: &[RunRecord]) -> String {
    if records.is_empty() {
        return "No runs logged yet.".to_string();
    }

    let summary = Summary::from_records(records);
    format!(
        "{}\n## Distance by Day\n\n{}\n## Runs\n\n{}",
        render_summary(&summary),
        render_chart(&chart_series(records)),
        render_table(records)
    )
}

fn track_bounds(points: &[(f64, f64)]) -> Option<(f64, f64, f64, f64)> {
    let (first_lat, first_lon) = *points.first()?;
    Some(points.iter().fold(
        (first_lat, first_lon, first_lat, first_lon),
        |(min_lat, min_lon, max_lat, max_lon), &(lat, lon)| {
            (min_lat.min(lat), min_lon.min(lon), max_lat.max(lat), max_lon.max(lon))
        },
    ))
}

fn config_error(error: ConfigError) -> McpError {
    McpError::invalid_params_no_data(format!("Configuration error: {}", error))
}

fn strava_error(error: StravaError) -> McpError {
    let message = error.to_string();
    match error {
        StravaError::NotConnected | StravaError::Callback(_) => McpError::invalid_params_no_data(message),
        ref e if e.is_auth_error() => McpError::invalid_params_no_data(format!(
            "Strava rejected the credentials or code; request a new authorization code and try again. ({})",
            message
        )),
        _ => McpError::internal(message),
    }
}

fn session_error(error: SessionError) -> McpError {
    McpError::invalid_params_no_data(error.to_string())
}

// Helper methods for McpError
trait McpErrorExt {
    fn internal<E: std::fmt::Display>(error: E) -> Self;
    fn invalid_params_no_data<S: Into<String>>(message: S) -> Self;
}

impl McpErrorExt for McpError {
    fn internal<E: std::fmt::Display>(error: E) -> Self {
        McpError::internal_error(format!("Internal error: {}", error), None)
    }

    fn invalid_params_no_data<S: Into<String>>(message: S) -> Self {
        McpError::invalid_params(message.into(), None)
    }
}
