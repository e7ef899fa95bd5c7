use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use pacing_simulator::api::router;
use pacing_simulator::campaign::CampaignProfile;
use pacing_simulator::campaigns::Campaigns;
use pacing_simulator::config::AppConfig;
use pacing_simulator::state::AppState;

async fn send(state: AppState, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn simulate(state: AppState, query: &str) -> (StatusCode, Value) {
    send(state, "POST", &format!("/api/bidding/simulate?{}", query)).await
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = send(AppState::default(), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_list_campaigns() {
    let (status, body) = send(AppState::default(), "GET", "/api/campaigns").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<u64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["campaign_id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![101, 102, 103, 104, 105]);
}

#[tokio::test]
async fn test_get_campaign() {
    let (status, body) = send(AppState::default(), "GET", "/api/campaigns/103").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["budget"], 1000.0);

    let (status, body) = send(AppState::default(), "GET", "/api/campaigns/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_simulate_default_steps() {
    let (status, body) = simulate(AppState::default(), "campaign_id=101").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["campaign_id"], 101);
    assert_eq!(body["meta"]["steps_requested"], 48);

    let history = body["history"].as_array().unwrap();
    assert!(!history.is_empty() && history.len() <= 48);
    assert_eq!(body["summary"]["steps_completed"], history.len());
    for (i, record) in history.iter().enumerate() {
        assert_eq!(record["step"], i);
        assert!(record["alpha"].as_f64().unwrap() > 0.0);
        assert!(record["wins"].as_u64().unwrap() <= record["traffic"].as_u64().unwrap());
    }
}

#[tokio::test]
async fn test_simulate_explicit_steps() {
    let (status, body) = simulate(AppState::default(), "campaign_id=104&steps=12").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["steps_requested"], 12);
    assert!(body["history"].as_array().unwrap().len() <= 12);
}

#[tokio::test]
async fn test_simulate_is_deterministic() {
    let (_, first) = simulate(AppState::default(), "campaign_id=102&steps=24").await;
    let (_, second) = simulate(AppState::default(), "campaign_id=102&steps=24").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_simulate_rejects_step_counts() {
    for query in ["campaign_id=101&steps=0", "campaign_id=101&steps=101"] {
        let (status, body) = simulate(AppState::default(), query).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", query);
        assert_eq!(body["kind"], "validation");
        assert_eq!(body["field"], "steps");
    }
}

#[tokio::test]
async fn test_simulate_missing_campaign_id() {
    let (status, body) = simulate(AppState::default(), "steps=10").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "query");
}

#[tokio::test]
async fn test_simulate_unknown_campaign() {
    let (status, body) = simulate(AppState::default(), "campaign_id=999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_simulate_invalid_campaign_profile() {
    let campaigns = Campaigns::from_profiles(&[CampaignProfile::new(
        7,
        "broken",
        "adv-7",
        "ecommerce",
        0.0,
        50.0,
    )]);
    let state = AppState::with_directory(AppConfig::default(), Arc::new(campaigns));
    let (status, body) = simulate(state, "campaign_id=7").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "initial_budget");
}

#[tokio::test]
async fn test_simulate_timeout() {
    let mut config = AppConfig::default();
    config.simulation.timeout_ms = 0;
    let (status, body) = simulate(AppState::new(config), "campaign_id=101").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["kind"], "timeout");
}
