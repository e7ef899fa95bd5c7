use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::campaign::CampaignProfile;
use crate::errors::SimulationError;
use crate::report::SimulationReport;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/campaigns", get(list_campaigns))
        .route("/api/campaigns/:campaign_id", get(get_campaign))
        .route("/api/bidding/simulate", post(simulate_bidding))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_campaigns(State(state): State<AppState>) -> Json<Vec<CampaignProfile>> {
    Json(state.service.campaigns())
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<u64>,
) -> Result<Json<CampaignProfile>, ApiError> {
    Ok(Json(state.service.campaign(campaign_id)?))
}

#[derive(Debug, Deserialize)]
pub struct SimulateQuery {
    pub campaign_id: u64,
    pub steps: Option<usize>,
}

/// Run the pacing simulation for one campaign
/// A missing or malformed query is a validation failure like any other bad parameter
async fn simulate_bidding(
    State(state): State<AppState>,
    query: Result<Query<SimulateQuery>, QueryRejection>,
) -> Result<Json<SimulationReport>, ApiError> {
    let Query(query) = query.map_err(|rejection| SimulationError::validation("query", rejection.body_text()))?;
    let report = state.service.simulate(query.campaign_id, query.steps).await?;
    Ok(Json(report))
}

// ===== Error Handling =====

#[derive(Debug)]
pub struct ApiError(pub SimulationError);

impl From<SimulationError> for ApiError {
    fn from(err: SimulationError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SimulationError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SimulationError::CampaignNotFound(_) => StatusCode::NOT_FOUND,
            SimulationError::Computation { .. } | SimulationError::TaskFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SimulationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "request failed: {}", self.0);
        }

        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if let SimulationError::Validation { field, .. } = &self.0 {
            body["field"] = json!(field);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(SimulationError::validation("steps", "must be > 0")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError(SimulationError::CampaignNotFound(1)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError(SimulationError::computation(3, "nan")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError(SimulationError::TaskFailed("worker panicked".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError(SimulationError::Timeout { completed_steps: 1, elapsed_ms: 5 }).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
