//! OTP sign-in, token refresh, and logout.

use axum::{extract::State, Extension, Json};
use bazaar_core::services::Session;
use serde::{Deserialize, Serialize};

use crate::extract::ApiJson;
use crate::middleware::{BearerToken, CurrentUser, RequestId};

use super::{map_service_error, respond, ApiError, ApiResponse, AppState};

// Missing fields deserialize to "" so they fail validation with a 400
// instead of a body rejection.
#[derive(Debug, Deserialize)]
pub(super) struct SendOtpRequest {
    #[serde(default)]
    phone_number: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct VerifyOtpRequest {
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RefreshRequest {
    #[serde(default)]
    refresh: String,
}

#[derive(Debug, Serialize)]
pub(super) struct MessageBody {
    message: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct AccessBody {
    access: String,
}

/// POST /api/v1/auth/send-otp
pub(super) async fn send_otp(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<SendOtpRequest>,
) -> Result<Json<ApiResponse<MessageBody>>, ApiError> {
    state
        .services
        .auth
        .send_otp(&body.phone_number)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;

    Ok(respond(
        &req_id,
        MessageBody {
            message: "OTP sent successfully.",
        },
    ))
}

/// POST /api/v1/auth/verify-otp
pub(super) async fn verify_otp(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<Session>>, ApiError> {
    let session = state
        .services
        .auth
        .verify_otp(&body.phone_number, &body.code)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, session))
}

/// POST /api/v1/auth/token/refresh
pub(super) async fn refresh_token(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> Result<Json<ApiResponse<AccessBody>>, ApiError> {
    let access = state
        .services
        .auth
        .refresh_access(&body.refresh)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, AccessBody { access }))
}

/// POST /api/v1/auth/logout: revoke the presented access token.
pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(_user): CurrentUser,
    Extension(token): Extension<BearerToken>,
) -> Result<Json<ApiResponse<MessageBody>>, ApiError> {
    state
        .services
        .auth
        .logout(&token.0)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(
        &req_id,
        MessageBody {
            message: "Logged out successfully.",
        },
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::TestApp;

    #[tokio::test]
    async fn send_otp_requires_phone_number() {
        let app = TestApp::new();
        let (status, body) = app
            .send("POST", "/api/v1/auth/send-otp", None, Some(json!({})))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["fields"]["phone_number"].is_array());
    }

    #[tokio::test]
    async fn otp_sign_in_flow_issues_working_tokens() {
        let app = TestApp::new();
        let otp = app
            .services
            .auth
            .send_otp("09121234567")
            .await
            .expect("otp");

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/auth/verify-otp",
                None,
                Some(json!({ "phone_number": "09121234567", "code": otp.code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_admin"], false);
        let access = body["data"]["access"].as_str().expect("access").to_string();
        let refresh = body["data"]["refresh"].as_str().expect("refresh").to_string();

        let (status, _) = app.send("GET", "/api/v1/scores", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/auth/token/refresh",
                None,
                Some(json!({ "refresh": refresh })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["access"].is_string());
    }

    #[tokio::test]
    async fn wrong_code_is_a_bad_request() {
        let app = TestApp::new();
        app.services.auth.send_otp("0912").await.expect("otp");

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/auth/verify-otp",
                None,
                Some(json!({ "phone_number": "0912", "code": "abcdef" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "invalid OTP");
    }

    #[tokio::test]
    async fn logout_revokes_the_access_token() {
        let app = TestApp::new();
        let (_, access) = app.customer("0913").await;

        let (status, _) = app
            .send("POST", "/api/v1/auth/logout", Some(&access), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.send("GET", "/api/v1/scores", Some(&access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "token has been revoked");
    }

    #[tokio::test]
    async fn logout_requires_a_token() {
        let app = TestApp::new();
        let (status, _) = app.send("POST", "/api/v1/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
