use axum::{extract::State, http::StatusCode, Extension, Json};
use bazaar_core::accounts::{ScoreEvent, ScoreSummary};
use chrono::Utc;

use crate::middleware::{CurrentUser, RequestId};

use super::{created, map_service_error, respond, ApiError, ApiResponse, AppState};

/// GET /api/v1/scores: the caller's events and point total.
pub(super) async fn list_scores(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<ScoreSummary>>, ApiError> {
    let summary = state
        .services
        .scores
        .summary(user.id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, summary))
}

/// POST /api/v1/scores/daily-login: once per UTC day, 409 afterwards.
pub(super) async fn daily_login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<ApiResponse<ScoreEvent>>), ApiError> {
    let event = state
        .services
        .scores
        .record_daily_login(user.id, Utc::now().date_naive())
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, event))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::test_support::TestApp;

    #[tokio::test]
    async fn daily_login_counts_once_per_day() {
        let app = TestApp::new();
        let (_, token) = app.customer("09120000030").await;

        let (status, body) = app
            .send("POST", "/api/v1/scores/daily-login", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["score_title"], "daily_login");

        let (status, body) = app
            .send("POST", "/api/v1/scores/daily-login", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");

        let (status, body) = app.send("GET", "/api/v1/scores", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_points"], 1);
        assert_eq!(body["data"]["events"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn scores_require_sign_in() {
        let app = TestApp::new();
        let (status, _) = app.send("GET", "/api/v1/scores", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
