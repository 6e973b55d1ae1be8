//! Blog posts and highlights.
//!
//! Any signed-in user may write posts and edit their own; staff may edit all.
//! Highlight writes are staff-only.

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::content::{
    Highlight, HighlightDetail, HighlightInput, HighlightMedia, HighlightMediaInput, PostDetail,
    PostImage, PostInput,
};
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{CurrentUser, RequestId, StaffUser};

use super::{created, map_service_error, respond, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PostImageRequest {
    post_id: Option<i64>,
    image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct UploadRequest {
    image: String,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// GET /api/v1/posts, newest first.
pub(super) async fn list_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<PostDetail>>>, ApiError> {
    let posts = state
        .services
        .content
        .list_posts()
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, posts))
}

pub(super) async fn get_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<PostDetail>>, ApiError> {
    let post = state
        .services
        .content
        .get_post(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, post))
}

pub(super) async fn create_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<PostInput>,
) -> Result<(StatusCode, Json<ApiResponse<PostDetail>>), ApiError> {
    let post = state
        .services
        .content
        .create_post(&user, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, post))
}

pub(super) async fn update_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<PostInput>,
) -> Result<Json<ApiResponse<PostDetail>>, ApiError> {
    let post = state
        .services
        .content
        .update_post(&user, id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, post))
}

pub(super) async fn delete_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .content
        .delete_post(&user, id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/post-images
pub(super) async fn add_post_image(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<PostImageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PostImage>>), ApiError> {
    let image = state
        .services
        .content
        .add_post_image(&user, body.post_id, &body.image)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, image))
}

/// POST /api/v1/wysiwyg-upload: editor upload not yet tied to a post.
pub(super) async fn wysiwyg_upload(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<UploadRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PostImage>>), ApiError> {
    let image = state
        .services
        .content
        .add_post_image(&user, None, &body.image)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, image))
}

// ---------------------------------------------------------------------------
// Highlights
// ---------------------------------------------------------------------------

pub(super) async fn list_highlights(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<HighlightDetail>>>, ApiError> {
    let highlights = state
        .services
        .content
        .list_highlights()
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, highlights))
}

pub(super) async fn get_highlight(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<HighlightDetail>>, ApiError> {
    let highlight = state
        .services
        .content
        .get_highlight(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, highlight))
}

pub(super) async fn create_highlight(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiJson(body): ApiJson<HighlightInput>,
) -> Result<(StatusCode, Json<ApiResponse<Highlight>>), ApiError> {
    let highlight = state
        .services
        .content
        .create_highlight(body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, highlight))
}

pub(super) async fn update_highlight(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<HighlightInput>,
) -> Result<Json<ApiResponse<Highlight>>, ApiError> {
    let highlight = state
        .services
        .content
        .update_highlight(id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, highlight))
}

pub(super) async fn delete_highlight(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .content
        .delete_highlight(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/highlights/{id}/media
pub(super) async fn add_highlight_media(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<HighlightMediaInput>,
) -> Result<(StatusCode, Json<ApiResponse<HighlightMedia>>), ApiError> {
    let media = state
        .services
        .content
        .add_highlight_media(id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, media))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::TestApp;

    #[tokio::test]
    async fn author_edits_own_post_but_not_others() {
        let app = TestApp::new();
        let (author, author_token) = app.customer("09120000040").await;
        let (_, other_token) = app.customer("09120000041").await;

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/posts",
                Some(&author_token),
                Some(json!({ "title": "Spring drop", "content": "<p>new</p>" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["author"]["id"], author.id);
        let post = body["data"]["id"].as_i64().expect("post id");
        let uri = format!("/api/v1/posts/{post}");

        let (status, _) = app
            .send(
                "PUT",
                &uri,
                Some(&other_token),
                Some(json!({ "title": "hijacked", "content": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send(
                "PUT",
                &uri,
                Some(&author_token),
                Some(json!({ "title": "Spring drop II", "content": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Spring drop II");

        let (status, _) = app.send("DELETE", &uri, Some(&other_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.send("DELETE", &uri, Some(&author_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.send("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn post_requires_title() {
        let app = TestApp::new();
        let (_, token) = app.customer("09120000042").await;
        let (status, body) = app
            .send("POST", "/api/v1/posts", Some(&token), Some(json!({ "content": "x" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["fields"]["title"].is_array());
    }

    #[tokio::test]
    async fn images_attach_to_posts_or_stay_detached() {
        let app = TestApp::new();
        let (_, token) = app.customer("09120000043").await;
        let (_, body) = app
            .send(
                "POST",
                "/api/v1/posts",
                Some(&token),
                Some(json!({ "title": "Lookbook", "content": "" })),
            )
            .await;
        let post = body["data"]["id"].as_i64().expect("post id");

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/post-images",
                Some(&token),
                Some(json!({ "post_id": post, "image": "posts/look.jpg" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["post_id"], post);

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/wysiwyg-upload",
                Some(&token),
                Some(json!({ "image": "editor/inline.png" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"]["post_id"].is_null());

        let (_, body) = app
            .send("GET", &format!("/api/v1/posts/{post}"), None, None)
            .await;
        assert_eq!(body["data"]["images"].as_array().map(Vec::len), Some(1));

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/post-images",
                Some(&token),
                Some(json!({ "post_id": 9999, "image": "posts/x.jpg" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["fields"]["post_id"].is_array());
    }

    #[tokio::test]
    async fn staff_manage_highlights_and_media() {
        let app = TestApp::new();
        let (_, staff) = app.staff().await;
        let (_, customer) = app.customer("09120000044").await;
        let highlight = json!({ "title": "Summer", "cover_image": "highlights/summer.jpg" });

        let (status, _) = app
            .send("POST", "/api/v1/highlights", Some(&customer), Some(highlight.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send("POST", "/api/v1/highlights", Some(&staff), Some(highlight))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_i64().expect("highlight id");

        for media in [
            json!({ "media_type": "video", "media_file": "stories/a.mp4" }),
            json!({ "media_file": "stories/b.jpg" }),
        ] {
            let (status, _) = app
                .send(
                    "POST",
                    &format!("/api/v1/highlights/{id}/media"),
                    Some(&staff),
                    Some(media),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = app.send("GET", "/api/v1/highlights", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let media = &body["data"][0]["media"];
        assert_eq!(media[0]["media_type"], "video");
        assert!(media[1]["media_type"].is_null());

        let (status, _) = app
            .send("DELETE", &format!("/api/v1/highlights/{id}"), Some(&staff), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
