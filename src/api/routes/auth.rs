//! Login, current user and token refresh.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::info;

use crate::api::auth::{CurrentUser, TokenResponse};
use crate::api::error::ApiError;
use crate::api::server::AppState;

const MAX_USERNAME_CHARS: usize = 50;

/// Request body for `POST /auth/login`.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let len = self.username.chars().count();
        if len == 0 || len > MAX_USERNAME_CHARS {
            return Err(ApiError::Unprocessable(format!(
                "username must be between 1 and {MAX_USERNAME_CHARS} characters"
            )));
        }
        if self.password.is_empty() {
            return Err(ApiError::Unprocessable(
                "password must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// POST /auth/login: exchange admin credentials for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(body) = payload?;
    body.validate()?;

    // bcrypt is CPU-bound; keep it off the async workers.
    let auth_state = Arc::clone(&state);
    let token = tokio::task::spawn_blocking(move || {
        auth_state.auth.login(&body.username, &body.password)
    })
    .await
    .map_err(|e| ApiError::internal(format!("login task failed: {e}")))??;

    info!("Admin login succeeded");
    Ok(Json(token))
}

/// GET /auth/me
pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<CurrentUser> {
    Json(user)
}

/// POST /auth/refresh: issue a fresh token for the caller.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<TokenResponse>, ApiError> {
    Ok(Json(state.auth.issue(&user.username)?))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::test_support::*;
    use crate::api::server::build_router;
    use crate::api::server::testing::{test_state, TEST_PASSWORD};
    use axum::http::{header, StatusCode};
    use serde_json::json;
    use tower::util::ServiceExt;

    const LOGIN: &str = "/api/v1/auth/login";

    #[tokio::test]
    async fn test_login_then_me() {
        let app = build_router(test_state());
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                LOGIN,
                None,
                json!({"username": "admin", "password": TEST_PASSWORD}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 1800);
        let token = body["access_token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(empty_request(
                "GET",
                "/api/v1/auth/me",
                Some(&format!("Bearer {token}")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({"username": "admin", "is_active": true, "is_admin": true})
        );
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                LOGIN,
                None,
                json!({"username": "admin", "password": "wrong"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Incorrect username or password");
        assert!(body.get("access_token").is_none());
    }

    #[tokio::test]
    async fn test_login_wrong_username() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                LOGIN,
                None,
                json!({"username": "root", "password": TEST_PASSWORD}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_malformed_body_is_422() {
        let app = build_router(test_state());
        for body in [
            json!({"username": "admin"}),
            json!({"username": "", "password": "x"}),
            json!({"username": "a".repeat(51), "password": "x"}),
            json!({"username": "admin", "password": ""}),
        ] {
            let response = app
                .clone()
                .oneshot(json_request("POST", LOGIN, None, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[tokio::test]
    async fn test_refresh_issues_new_token() {
        let state = test_state();
        let auth = crate::api::server::testing::bearer(&state);
        let app = build_router(state.clone());
        let response = app
            .oneshot(empty_request("POST", "/api/v1/auth/refresh", Some(&auth)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["access_token"].as_str().unwrap();
        assert_eq!(state.auth.resolve(token).unwrap().username, "admin");
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_forbidden() {
        let app = build_router(test_state());
        let response = app
            .oneshot(empty_request("POST", "/api/v1/auth/refresh", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_rate_limited_after_five_attempts() {
        let app = build_router(test_state());
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    LOGIN,
                    None,
                    json!({"username": "admin", "password": "wrong"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = app
            .oneshot(json_request(
                "POST",
                LOGIN,
                None,
                json!({"username": "admin", "password": TEST_PASSWORD}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = body_json(response).await;
        assert_eq!(body["type"], "rate_limit_error");
    }
}
