// The AI collaboration protocol: Received → Validated → Dispatched →
// (Completed | TimedOut | Failed).
//
// Validation happens at the route before anything here runs. Dispatch races
// the provider call against a fixed wall-clock timeout; on timeout the
// in-flight call is abandoned and a fixed message comes back. Provider
// failures are masked into fixed messages on a success-shaped payload —
// the calling surface never needs provider-specific error handling.

pub mod parse;
pub mod prompt;
pub mod provider;
pub mod validate;

use std::time::Duration;

use tracing::warn;

use marginalia_common::protocol::collab::CollabResponse;

use provider::{Provider, ProviderError};
use validate::ValidRequest;

pub const TIMEOUT_MESSAGE: &str =
    "The margin editor took too long to answer. Try again in a moment.";
pub const AUTH_FAILURE_MESSAGE: &str =
    "The configured AI credential was rejected. Check the API key and try again.";
pub const RATE_LIMIT_MESSAGE: &str =
    "The AI service is handling too many requests right now. Try again shortly.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "The margin editor could not respond this time. Your document is unchanged.";

/// Run one validated request through assemble → dispatch → parse.
///
/// Exactly one provider attempt; no retry and no cancellation token. Every
/// outcome is a normal response payload.
pub async fn run_collaboration(
    provider: &dyn Provider,
    request: &ValidRequest,
    max_tokens: u32,
    timeout: Duration,
) -> CollabResponse {
    let user_message = prompt::build_user_message(request);

    let attempt = provider.complete(prompt::SYSTEM_INSTRUCTION, &user_message, max_tokens);
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(raw)) => parse::parse_collab_reply(request.mode, &raw),
        Ok(Err(error)) => {
            warn!(mode = request.mode.as_str(), error = %error, "provider call failed");
            CollabResponse::message_only(failure_message(&error))
        }
        Err(_elapsed) => {
            warn!(
                mode = request.mode.as_str(),
                timeout_secs = timeout.as_secs(),
                "provider call timed out, abandoning in-flight request"
            );
            CollabResponse::message_only(TIMEOUT_MESSAGE)
        }
    }
}

/// Fixed user-facing text per failure class.
pub fn failure_message(error: &ProviderError) -> &'static str {
    match error {
        ProviderError::Auth { .. } => AUTH_FAILURE_MESSAGE,
        ProviderError::RateLimited { .. } => RATE_LIMIT_MESSAGE,
        _ => GENERIC_FAILURE_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use marginalia_common::protocol::collab::ContextPack;
    use marginalia_common::types::AiMode;

    use super::*;

    struct FixedProvider {
        reply: String,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        async fn complete(&self, _: &str, _: &str, _: u32) -> Result<String, ProviderError> {
            Ok(self.reply.clone())
        }
    }

    struct FailingProvider {
        error: fn() -> ProviderError,
    }

    #[async_trait]
    impl Provider for FailingProvider {
        async fn complete(&self, _: &str, _: &str, _: u32) -> Result<String, ProviderError> {
            Err((self.error)())
        }
    }

    /// Never resolves; only the timeout can end the dispatch.
    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        async fn complete(&self, _: &str, _: &str, _: u32) -> Result<String, ProviderError> {
            std::future::pending().await
        }
    }

    fn request(mode: AiMode) -> ValidRequest {
        ValidRequest {
            mode,
            user_prompt: "Is this clear?".to_string(),
            context: ContextPack {
                selected_text: "The fox jumps.".to_string(),
                ..Default::default()
            },
            brain: None,
        }
    }

    #[tokio::test]
    async fn critique_returns_reply_verbatim() {
        let provider = FixedProvider { reply: "Crisp. Keep it.".to_string() };
        let response = run_collaboration(
            &provider,
            &request(AiMode::Critique),
            1024,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(response.message, "Crisp. Keep it.");
        assert!(response.proposed_text.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_resolves_with_the_timeout_message() {
        let response = run_collaboration(
            &StalledProvider,
            &request(AiMode::Critique),
            1024,
            Duration::from_secs(45),
        )
        .await;

        assert_eq!(response.message, TIMEOUT_MESSAGE);
        assert!(response.proposed_text.is_none());
    }

    #[tokio::test]
    async fn failures_map_onto_fixed_messages() {
        let cases: Vec<(fn() -> ProviderError, &str)> = vec![
            (
                || ProviderError::Auth { message: "bad key".to_string() },
                AUTH_FAILURE_MESSAGE,
            ),
            (
                || ProviderError::RateLimited { message: "slow down".to_string() },
                RATE_LIMIT_MESSAGE,
            ),
            (
                || ProviderError::Api {
                    status: 529,
                    message: "overloaded".to_string(),
                    code: None,
                },
                GENERIC_FAILURE_MESSAGE,
            ),
        ];

        for (error, expected) in cases {
            let provider = FailingProvider { error };
            let response = run_collaboration(
                &provider,
                &request(AiMode::Critique),
                1024,
                Duration::from_secs(5),
            )
            .await;
            assert_eq!(response.message, expected);
        }
    }

    #[tokio::test]
    async fn synthesize_parses_the_structured_reply() {
        let provider = FixedProvider {
            reply: "```json\n{\"message\":\"m\",\"proposedText\":\"p\"}\n```".to_string(),
        };
        let response = run_collaboration(
            &provider,
            &request(AiMode::Synthesize),
            4096,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(response.message, "m");
        assert_eq!(response.proposed_text.as_deref(), Some("p"));
    }
}
