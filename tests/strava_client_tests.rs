//! Strava client and token handling against a local stand-in for the API.

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use runmaster::config::Config;
use runmaster::error::{NormalizeError, StravaError};
use runmaster::models::{Feeling, Source, TokenCache};
use runmaster::normalize::normalize_activity;
use runmaster::oauth::TokenManager;
use runmaster::session::Session;
use runmaster::strava::StravaClient;
use serde_json::{json, Value};
use std::collections::HashMap;

async fn token_endpoint(
    Form(params): Form<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let grant = params.get("grant_type").map(String::as_str);
    let ok = match grant {
        Some("authorization_code") => params.get("code").map(String::as_str) == Some("good-code"),
        Some("refresh_token") => params.get("refresh_token").map(String::as_str) == Some("refresh-1"),
        _ => false,
    };
    if !ok || params.get("client_id").map(String::as_str) != Some("12345") {
        return Err((
            StatusCode::BAD_REQUEST,
            r#"{"message":"Bad Request","errors":[{"resource":"AuthorizationCode","code":"invalid"}]}"#
                .to_string(),
        ));
    }

    let access = if grant == Some("refresh_token") {
        "access-2"
    } else {
        "access-1"
    };
    Ok(Json(json!({
        "token_type": "Bearer",
        "access_token": access,
        "refresh_token": "refresh-1",
        "expires_at": Utc::now().timestamp() + 21600,
        "expires_in": 21600,
    })))
}

async fn activities_endpoint(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth != "Bearer access-1" && auth != "Bearer access-2" {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let per_page: usize = query
        .get("per_page")
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    let all = json!([
        {
            "id": 101, "name": "Morning Run", "type": "Run", "sport_type": "Run",
            "start_date_local": "2024-05-01T07:00:00Z",
            "distance": 10000.0, "moving_time": 3000, "average_speed": 3.333
        },
        { "name": "no id here" },
        {
            "id": 102, "name": "Tempo", "type": "Run", "sport_type": "Run",
            "start_date_local": "2024-05-02T18:30:00Z",
            "distance": {"magnitude": 5000}, "moving_time": {"seconds": 1620}
        },
        {
            "id": 103, "name": "Mystery", "type": "Run", "sport_type": "Run",
            "start_date_local": "2024-05-03T18:30:00Z",
            "distance": {"furlongs": 25}, "moving_time": 1800
        }
    ]);
    let items: Vec<Value> = all
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .take(per_page)
        .collect();
    Ok(Json(Value::Array(items)))
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/oauth/token", post(token_endpoint))
        .route("/api/v3/athlete/activities", get(activities_endpoint));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(base: &str) -> Config {
    Config {
        api_base: base.to_string(),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_exchange_code() {
    let base = spawn_stub().await;
    let client = StravaClient::new(base.as_str()).unwrap();

    let token = client
        .exchange_code("12345", "test_secret", "good-code")
        .await
        .unwrap();
    assert_eq!(token.access_token, "access-1");
    assert_eq!(token.refresh_token, "refresh-1");
    assert!(token.expires_at > Utc::now().timestamp());
}

#[tokio::test]
async fn test_exchange_bad_code_is_auth_error() {
    let base = spawn_stub().await;
    let client = StravaClient::new(base.as_str()).unwrap();

    let err = client
        .exchange_code("12345", "test_secret", "stale-code")
        .await
        .unwrap_err();
    match &err {
        StravaError::Api { status, body } => {
            assert_eq!(*status, 400);
            assert!(body.contains("AuthorizationCode"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_fetch_activities_skips_malformed_entries() {
    let base = spawn_stub().await;
    let client = StravaClient::new(base.as_str()).unwrap();

    let activities = client.fetch_activities("access-1", 10).await.unwrap();
    let ids: Vec<i64> = activities.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![101, 102, 103]);

    let limited = client.fetch_activities("access-1", 1).await.unwrap();
    assert_eq!(limited.len(), 1);

    let err = client.fetch_activities("wrong", 5).await.unwrap_err();
    assert!(matches!(err, StravaError::Api { status: 401, .. }));
}

#[tokio::test]
async fn test_connect_fetch_and_accept() {
    let base = spawn_stub().await;
    let config = config(&base);
    let manager = TokenManager::new(config, StravaClient::new(base.as_str()).unwrap());
    let mut session = Session::new();

    let token = manager.exchange_code("good-code").await.unwrap();
    let token = manager.fresh_token(Some(token)).await.unwrap();
    assert_eq!(token.access_token, "access-1");

    let raw = manager
        .client()
        .fetch_activities(&token.access_token, 5)
        .await
        .unwrap();
    session.set_token(token);
    let mut normalized = Vec::new();
    let mut failures = Vec::new();
    for activity in &raw {
        match normalize_activity(activity) {
            Ok(n) => normalized.push(n),
            Err(e) => failures.push((activity.id, e)),
        }
    }

    assert_eq!(normalized.len(), 2);
    assert_eq!(normalized[0].distance_km, 10.0);
    assert_eq!(normalized[0].duration_min, 50);
    assert_eq!(normalized[1].distance_km, 5.0);
    assert_eq!(normalized[1].duration_min, 27);

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 103);
    assert!(matches!(
        failures[0].1,
        NormalizeError::UnrecognizedUnitFormat { field: "distance", .. }
    ));

    session.replace_fetched(normalized);
    let record = session.accept_activity(102, Feeling::Good).unwrap();
    assert_eq!(record.pace, "5:24");
    assert_eq!(record.source, Source::Strava);
    assert_eq!(record.calorie_estimate, 324);
}

#[tokio::test]
async fn test_expiring_token_is_refreshed() {
    let base = spawn_stub().await;
    let manager = TokenManager::new(config(&base), StravaClient::new(base.as_str()).unwrap());
    let expiring = TokenCache {
        access_token: "access-1".to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_at: Utc::now().timestamp() + 60,
    };

    let token = manager.fresh_token(Some(expiring)).await.unwrap();
    assert_eq!(token.access_token, "access-2");
    assert!(!token.is_expiring_soon(300));

    let activities = manager
        .client()
        .fetch_activities(&token.access_token, 1)
        .await
        .unwrap();
    assert_eq!(activities.len(), 1);
}

#[test]
fn test_unreachable_api_is_http_error() {
    let client = StravaClient::new("http://127.0.0.1:9").unwrap();
    let result = tokio_test::block_on(client.fetch_activities("access-1", 5));
    assert!(matches!(result, Err(StravaError::Http(_))));
}
