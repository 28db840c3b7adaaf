use super::http_client::{
    build_provider_client, call_with_retry, failure_from_response, map_transport_error,
};
use super::traits::{Backend, clamp_input};
use super::types::{CallFailure, ProviderId};
use crate::error::ConstructionError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const KEY_PREFIX: &str = "sk-ant-";
const MIN_KEY_LEN: usize = 30;

const MODELS: &[&str] = &[
    "claude-sonnet-4-5",
    "claude-opus-4-1",
    "claude-3-7-sonnet-latest",
    "claude-3-5-haiku-latest",
];
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const INPUT_LIMIT_CHARS: usize = 60_000;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(25);
const RETRY_BASE_DELAY: Duration = Duration::from_secs(3);
const CALL_BUDGET: Duration = Duration::from_secs(60);

pub(crate) fn validate_credential(key: &str) -> Result<(), ConstructionError> {
    let key = key.trim();
    if !key.starts_with(KEY_PREFIX) {
        return Err(ConstructionError::MalformedCredential {
            provider: ProviderId::Anthropic,
            reason: format!("expected {KEY_PREFIX:?} prefix"),
        });
    }
    if key.len() < MIN_KEY_LEN {
        return Err(ConstructionError::MalformedCredential {
            provider: ProviderId::Anthropic,
            reason: format!("shorter than {MIN_KEY_LEN} characters"),
        });
    }
    Ok(())
}

pub struct AnthropicBackend {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicBackend {
    pub fn new(api_key: &str) -> Result<Self, ConstructionError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, ConstructionError> {
        validate_credential(api_key)?;
        Ok(Self {
            api_key: api_key.trim().to_string(),
            client: build_provider_client(ATTEMPT_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call_api(
        &self,
        prompt: &str,
        context: Option<&str>,
        model: &str,
    ) -> Result<String, CallFailure> {
        let request = MessagesRequest {
            model,
            max_tokens: MAX_TOKENS,
            system: context,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Anthropic, &e))?;

        if !response.status().is_success() {
            return Err(failure_from_response(ProviderId::Anthropic, response).await);
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CallFailure::api(format!("anthropic response decode failed: {e}")))?;

        let text = messages
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(CallFailure::api("anthropic returned an empty completion"));
        }
        Ok(text)
    }
}

impl Backend for AnthropicBackend {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn models(&self) -> &[&str] {
        MODELS
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn call_budget(&self) -> Duration {
        CALL_BUDGET
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        context: Option<&'a str>,
        model: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CallFailure>> + Send + 'a>> {
        Box::pin(async move {
            let (prompt, context) = clamp_input(prompt, context, INPUT_LIMIT_CHARS);
            call_with_retry(ProviderId::Anthropic, RETRY_BASE_DELAY, || {
                self.call_api(&prompt, context.as_deref(), model)
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_shaped_key() {
        assert!(validate_credential("sk-ant-REDACTED").is_ok());
    }

    #[test]
    fn rejects_plain_openai_shaped_key() {
        // "sk-" alone is not enough; the full "sk-ant-" prefix is required.
        let err = validate_credential("sk-test-0123456789abcdefghijklmn").unwrap_err();
        assert!(err.to_string().contains("prefix"));
    }

    #[test]
    fn rejects_short_key() {
        assert!(validate_credential("sk-ant-short").is_err());
    }

    #[test]
    fn default_model_is_in_catalog() {
        let backend = AnthropicBackend::new("sk-ant-REDACTED").unwrap();
        assert!(backend.supports_model(backend.default_model()));
    }
}
