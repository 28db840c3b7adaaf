use super::http_client::{
    build_provider_client, call_with_retry, failure_from_response, map_transport_error,
    sanitize_api_error,
};
use super::traits::{Backend, clamp_input};
use super::types::{CallFailure, ProviderId};
use crate::error::ConstructionError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const KEY_PREFIX: &str = "AIza";
const MIN_KEY_LEN: usize = 30;

const MODELS: &[&str] = &["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.0-flash"];
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const INPUT_LIMIT_CHARS: usize = 40_000;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
const CALL_BUDGET: Duration = Duration::from_secs(45);

pub(crate) fn validate_credential(key: &str) -> Result<(), ConstructionError> {
    let key = key.trim();
    if !key.starts_with(KEY_PREFIX) {
        return Err(ConstructionError::MalformedCredential {
            provider: ProviderId::Gemini,
            reason: format!("expected {KEY_PREFIX:?} prefix"),
        });
    }
    if key.len() < MIN_KEY_LEN {
        return Err(ConstructionError::MalformedCredential {
            provider: ProviderId::Gemini,
            reason: format!("shorter than {MIN_KEY_LEN} characters"),
        });
    }
    Ok(())
}

pub struct GeminiBackend {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiBackend {
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
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: context.map(|system| Content {
                role: None,
                parts: vec![Part { text: system }],
            }),
        };
        let url = format!(
            "{}/v1beta/models/{model}:generateContent?key={}",
            self.base_url, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(ProviderId::Gemini, &e))?;

        if !response.status().is_success() {
            return Err(failure_from_response(ProviderId::Gemini, response).await);
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CallFailure::api(format!("gemini response decode failed: {e}")))?;

        if let Some(err) = result.error {
            return Err(CallFailure::api(format!(
                "gemini API error: {}",
                sanitize_api_error(&err.message)
            )));
        }

        let text = result
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(CallFailure::api("gemini returned an empty completion"));
        }
        Ok(text)
    }
}

impl Backend for GeminiBackend {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
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
            call_with_retry(ProviderId::Gemini, RETRY_BASE_DELAY, || {
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
        assert!(validate_credential("AIzaSyA0123456789abcdefghijklmnop").is_ok());
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(validate_credential("sk-0123456789abcdefghijklmnopqrst").is_err());
    }

    #[test]
    fn rejects_short_key() {
        assert!(validate_credential("AIzaShort").is_err());
    }

    #[test]
    fn default_model_is_in_catalog() {
        let backend = GeminiBackend::new("AIzaSyA0123456789abcdefghijklmnop").unwrap();
        assert!(backend.supports_model(backend.default_model()));
    }
}
