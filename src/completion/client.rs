//! Chat completion requests with retry and one silent token refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{Credential, TokenSource};
use crate::commit::prompt::SYSTEM_INSTRUCTION;
use crate::config::{Endpoints, RetryPolicy};
use crate::error::{AuthError, CompletionError};
use crate::http::{self, sanitize_error_body};
use crate::models::Model;

use super::retry::retry_transient;

/// Generated text and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Sends one prompt to a model.
///
/// This abstraction allows mocking the completion service in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, model: &Model, user_content: &str) -> Result<Completion, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Client for `POST /chat/completions`.
pub struct CompletionClient {
    client: reqwest::Client,
    endpoints: Endpoints,
    tokens: Arc<dyn TokenSource>,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(
        client: reqwest::Client,
        endpoints: Endpoints,
        tokens: Arc<dyn TokenSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            endpoints,
            tokens,
            retry,
        }
    }

    async fn complete_with(
        &self,
        credential: &Credential,
        model: &Model,
        user_content: &str,
    ) -> Result<Completion, CompletionError> {
        retry_transient(&self.retry, || self.send_once(credential, model, user_content)).await
    }

    async fn send_once(
        &self,
        credential: &Credential,
        model: &Model,
        user_content: &str,
    ) -> Result<Completion, CompletionError> {
        let url = format!("{}/chat/completions", self.endpoints.copilot_api_url);
        let request = ChatRequest {
            model: &model.id,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            stream: false,
        };

        let resp = http::with_editor_headers(self.client.post(&url))
            .header("Authorization", credential.authorization())
            .json(&request)
            .send()
            .await
            .map_err(CompletionError::Network)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_error(status, &body, retry_after, &model.id));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
        first_choice(body, &model.id)
    }
}

#[async_trait]
impl Completer for CompletionClient {
    /// One refresh-and-retry when the service reports the token expired; a
    /// second expiry is surfaced.
    async fn complete(&self, model: &Model, user_content: &str) -> Result<Completion, CompletionError> {
        let credential = self.tokens.valid_token().await?;
        debug!(
            "Requesting completion from {} ({} prompt chars)",
            model.id,
            user_content.len()
        );

        match self.complete_with(&credential, model, user_content).await {
            Err(CompletionError::AuthExpired) => {
                debug!("Completion rejected an expired token, refreshing once");
                let credential = self.tokens.refreshed_token().await?;
                match self.complete_with(&credential, model, user_content).await {
                    Err(CompletionError::AuthExpired) => Err(AuthError::AuthExpired.into()),
                    other => other,
                }
            }
            other => other,
        }
    }
}

/// Take the first choice with non-blank content.
fn first_choice(body: ChatResponse, requested: &str) -> Result<Completion, CompletionError> {
    if body.choices.len() > 1 {
        debug!("Received {} choices, using the first non-empty one", body.choices.len());
    }
    let text = body
        .choices
        .into_iter()
        .filter_map(|c| c.message.and_then(|m| m.content))
        .find(|text| !text.trim().is_empty())
        .ok_or(CompletionError::EmptyResponse)?;

    Ok(Completion {
        text,
        model: body.model.unwrap_or_else(|| requested.to_string()),
    })
}

/// Map an error response to a [`CompletionError`].
fn classify_error(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
    model_id: &str,
) -> CompletionError {
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => (env.error.code, env.error.message),
        Err(_) => (None, None),
    };
    let code = code.as_deref().unwrap_or("");

    if status == StatusCode::TOO_MANY_REQUESTS || code == "rate_limited" {
        warn!("Rate limited by the completion service");
        return CompletionError::RateLimited { retry_after };
    }
    if status == StatusCode::UNAUTHORIZED || code == "token_expired" {
        return CompletionError::AuthExpired;
    }
    if code == "model_not_supported" {
        return CompletionError::InvalidModel(model_id.to_string());
    }
    if status.is_server_error() {
        return CompletionError::Server {
            status: status.as_u16(),
            body: sanitize_error_body(body),
        };
    }

    CompletionError::Rejected {
        status: status.as_u16(),
        message: sanitize_error_body(message.as_deref().unwrap_or(body)),
    }
}

/// `Retry-After` in delay-seconds form.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
