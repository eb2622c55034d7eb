//! Prompt and conversation endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::{AgentResponse, ConversationRequest, PromptRequest, PromptResponse};
use crate::api::auth::CurrentUser;
use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::providers::available_models;

/// POST /agent/prompt
pub async fn prompt(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, ApiError> {
    let Json(request) = payload?;
    debug!(user = %user.username, model = ?request.model, "Prompt request");
    let response = state.service.process_prompt(&request).await?;
    Ok(Json(response))
}

/// POST /agent/conversation
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<ConversationRequest>, JsonRejection>,
) -> Result<Json<AgentResponse>, ApiError> {
    let Json(request) = payload?;
    debug!(
        user = %user.username,
        model = ?request.model,
        messages = request.messages.len(),
        "Conversation request"
    );
    let response = state.service.process_conversation(&request).await?;
    Ok(Json(response))
}

/// GET /agent/health
pub async fn agent_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "agent",
        "available_models": available_models(&state.config.providers),
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::test_support::*;
    use crate::api::server::build_router;
    use crate::api::server::testing::{bearer, state_with, test_config, test_state};
    use crate::providers::testing::MockFactory;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::util::ServiceExt;

    const PROMPT: &str = "/api/v1/agent/prompt";
    const CONVERSATION: &str = "/api/v1/agent/conversation";

    #[tokio::test]
    async fn test_prompt_success_then_cache_hit() {
        let factory = MockFactory::new();
        let calls = factory.calls.clone();
        let state = state_with(test_config(), factory);
        let auth = bearer(&state);
        let app = build_router(state);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    PROMPT,
                    Some(&auth),
                    json!({"message": "Hello there", "model": "gpt-4o"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["response"], "echo: Hello there");
            assert_eq!(body["model_used"], "gpt-4o");
            assert_eq!(body["tokens_used"], 12);
            assert!(body["conversation_id"].is_null());
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prompt_requires_auth() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request("POST", PROMPT, None, json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_prompt_invalid_model_is_400() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                PROMPT,
                Some(&auth),
                json!({"message": "hi", "model": "invalid/model/name"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Invalid model name");
        assert_eq!(body["type"], "validation_error");
    }

    #[tokio::test]
    async fn test_prompt_empty_message_is_400() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                PROMPT,
                Some(&auth),
                json!({"message": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_prompt_missing_field_is_422() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request("POST", PROMPT, Some(&auth), json!({"model": "gpt-4o"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_prompt_provider_failure_is_generic_500() {
        let state = state_with(test_config(), MockFactory::new().failing());
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                PROMPT,
                Some(&auth),
                json!({"message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "An unexpected error occurred");
        assert!(!body.to_string().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_conversation_empty_messages_is_400() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                CONVERSATION,
                Some(&auth),
                json!({"messages": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("At least one message is required"));
    }

    #[tokio::test]
    async fn test_conversation_unknown_role_is_422() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                CONVERSATION,
                Some(&auth),
                json!({"messages": [{"role": "wizard", "content": "hi"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_conversation_success() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                CONVERSATION,
                Some(&auth),
                json!({
                    "messages": [
                        {"role": "user", "content": "Hi"},
                        {"role": "assistant", "content": "Hello!"},
                        {"role": "user", "content": "How are you?"}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["response"]
            .as_str()
            .unwrap()
            .contains("Current message: How are you?"));
        assert_eq!(body["tool_calls"], json!([]));
        assert_eq!(body["metadata"]["message_count"], 3);
        assert_eq!(body["metadata"]["cached"], false);
        assert!(body["conversation_id"].is_string());
    }

    #[tokio::test]
    async fn test_agent_health_is_public() {
        let mut config = test_config();
        config.providers.gemini_api_key = Some("g-key".to_string());
        let app = build_router(state_with(config, MockFactory::new()));
        let response = app
            .oneshot(empty_request("GET", "/api/v1/agent/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "agent");
        assert_eq!(body["available_models"]["gemini"], true);
        assert_eq!(body["available_models"]["openai"], false);
    }
}
