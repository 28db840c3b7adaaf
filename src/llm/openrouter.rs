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

const KEY_PREFIX: &str = "sk-or-";
const MIN_KEY_LEN: usize = 24;

/// Aggregator catalog: models are namespaced by their upstream provider.
const MODELS: &[&str] = &[
    "anthropic/claude-sonnet-4-5",
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "google/gemini-2.5-flash",
    "meta-llama/llama-3.3-70b-instruct",
    "mistralai/mistral-large",
];
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-5";

const DEFAULT_BASE_URL: &str = "https://openrouter.ai";
const EXTRA_HEADERS: [(&str, &str); 2] = [
    ("HTTP-Referer", "https://github.com/palisade-dev/palisade"),
    ("X-Title", "Palisade"),
];
const INPUT_LIMIT_CHARS: usize = 48_000;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(25);
const RETRY_BASE_DELAY: Duration = Duration::from_secs(3);
const CALL_BUDGET: Duration = Duration::from_secs(60);

pub(crate) fn validate_credential(key: &str) -> Result<(), ConstructionError> {
    let key = key.trim();
    if !key.starts_with(KEY_PREFIX) {
        return Err(ConstructionError::MalformedCredential {
            provider: ProviderId::Openrouter,
            reason: format!("expected {KEY_PREFIX:?} prefix"),
        });
    }
    if key.len() < MIN_KEY_LEN {
        return Err(ConstructionError::MalformedCredential {
            provider: ProviderId::Openrouter,
            reason: format!("shorter than {MIN_KEY_LEN} characters"),
        });
    }
    Ok(())
}

pub struct OpenRouterBackend {
    auth_header: String,
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenRouterBackend {
    pub fn new(api_key: &str) -> Result<Self, ConstructionError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, ConstructionError> {
        validate_credential(api_key)?;
        Ok(Self {
            auth_header: format!("Bearer {}", api_key.trim()),
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
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = context {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest { model, messages };
        let url = format!("{}/api/v1/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(&request);
        for (name, value) in EXTRA_HEADERS {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Openrouter, &e))?;

        if !response.status().is_success() {
            return Err(failure_from_response(ProviderId::Openrouter, response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallFailure::api(format!("openrouter response decode failed: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| CallFailure::api("openrouter returned an empty completion"))
    }
}

impl Backend for OpenRouterBackend {
    fn id(&self) -> ProviderId {
        ProviderId::Openrouter
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
            call_with_retry(ProviderId::Openrouter, RETRY_BASE_DELAY, || {
                self.call_api(&prompt, context.as_deref(), model)
            })
            .await
        })
    }
}
