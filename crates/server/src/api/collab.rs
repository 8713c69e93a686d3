// The AI collaboration endpoint.
//
// Route:
//   POST /v1/ai/collaborate — validate → assemble → dispatch → parse
//
// Non-POST methods get a method-not-allowed status from the router.
// Validation failures are client errors naming the violated field. A
// missing provider credential is the one server error; every provider-side
// failure or timeout is masked into a 200 payload.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use marginalia_common::protocol::collab::{CollabRequest, CollabResponse};
use marginalia_common::types::AiMode;

use crate::ai::{self, provider::MessagesProvider, provider::Provider, validate};
use crate::config::{api_key_from_env, ServerConfig};
use crate::error::{ApiError, ErrorCode};
use crate::validation::ValidatedJson;

pub const CONFIG_MISSING_MESSAGE: &str =
    "No AI provider credential is configured. Set MARGINALIA_API_KEY and restart the server.";

#[derive(Clone)]
pub struct CollabApiState {
    /// None when no credential is configured; requests then fail with a
    /// setup message instead of reaching a provider.
    provider: Option<Arc<dyn Provider>>,
    critique_max_tokens: u32,
    synthesize_max_tokens: u32,
    timeout: Duration,
}

impl CollabApiState {
    pub fn from_config(config: &ServerConfig) -> Self {
        let provider = api_key_from_env().map(|api_key| {
            Arc::new(MessagesProvider::new(
                config.provider_url.clone(),
                api_key,
                config.model.clone(),
            )) as Arc<dyn Provider>
        });
        Self {
            provider,
            critique_max_tokens: config.critique_max_tokens,
            synthesize_max_tokens: config.synthesize_max_tokens,
            timeout: config.timeout,
        }
    }

    pub fn with_provider(provider: Option<Arc<dyn Provider>>, timeout: Duration) -> Self {
        Self { provider, critique_max_tokens: 1024, synthesize_max_tokens: 4096, timeout }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn max_tokens_for(&self, mode: AiMode) -> u32 {
        match mode {
            AiMode::Critique => self.critique_max_tokens,
            AiMode::Synthesize => self.synthesize_max_tokens,
        }
    }
}

pub fn router(state: CollabApiState) -> Router {
    Router::new().route("/v1/ai/collaborate", post(collaborate)).with_state(state)
}

async fn collaborate(
    State(state): State<CollabApiState>,
    ValidatedJson(request): ValidatedJson<CollabRequest>,
) -> Result<Json<CollabResponse>, ApiError> {
    let valid = validate::validate(&request).map_err(|error| {
        ApiError::new(ErrorCode::ValidationFailed, error.message)
            .with_details(json!({ "field": error.field }))
    })?;

    let Some(provider) = state.provider.as_ref() else {
        return Err(ApiError::new(ErrorCode::ConfigMissing, CONFIG_MISSING_MESSAGE));
    };

    let max_tokens = state.max_tokens_for(valid.mode);
    let response =
        ai::run_collaboration(provider.as_ref(), &valid, max_tokens, state.timeout).await;
    Ok(Json(response))
}
