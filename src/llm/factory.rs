use super::anthropic::{self, AnthropicBackend};
use super::gemini::{self, GeminiBackend};
use super::openai::{self, OpenAiBackend};
use super::openrouter::{self, OpenRouterBackend};
use super::traits::{Backend, BackendFactory};
use super::types::ProviderId;
use crate::error::ConstructionError;
use std::sync::Arc;

/// Cheap shape check without constructing a backend. Used by the config
/// snapshot to derive per-provider validity flags.
pub fn credential_looks_valid(id: ProviderId, key: &str) -> bool {
    match id {
        ProviderId::Openai => openai::validate_credential(key).is_ok(),
        ProviderId::Anthropic => anthropic::validate_credential(key).is_ok(),
        ProviderId::Gemini => gemini::validate_credential(key).is_ok(),
        ProviderId::Openrouter => openrouter::validate_credential(key).is_ok(),
    }
}

/// Default factory: real HTTP adapters against each provider's public
/// endpoint. Tests substitute their own [`BackendFactory`].
pub struct HttpBackendFactory;

impl BackendFactory for HttpBackendFactory {
    fn construct(
        &self,
        id: ProviderId,
        credential: &str,
    ) -> Result<Arc<dyn Backend>, ConstructionError> {
        Ok(match id {
            ProviderId::Openai => Arc::new(OpenAiBackend::new(credential)?),
            ProviderId::Anthropic => Arc::new(AnthropicBackend::new(credential)?),
            ProviderId::Gemini => Arc::new(GeminiBackend::new(credential)?),
            ProviderId::Openrouter => Arc::new(OpenRouterBackend::new(credential)?),
        })
    }
}
