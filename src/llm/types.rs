use crate::error::UnknownProvider;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier for one interchangeable completion backend.
///
/// The set is closed at compile time; adding a provider means adding a
/// variant here plus an adapter module.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Openai,
    Anthropic,
    Gemini,
    Openrouter,
}

impl ProviderId {
    /// All known providers, in registry iteration order.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }
}

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::Openrouter),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// One completion request as seen by the failover path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub context: Option<String>,
    pub model: Option<String>,
    pub preferred_provider: Option<ProviderId>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn preferring(mut self, provider: ProviderId) -> Self {
        self.preferred_provider = Some(provider);
        self
    }
}

/// The result every `generate` call resolves to.
///
/// `provider_used == "simulation"` together with `model_used == "fallback"`
/// marks a degraded response; callers treat it as a normal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub text: String,
    pub provider_used: String,
    pub model_used: String,
}

impl CompletionResult {
    pub fn from_provider(text: String, provider: ProviderId, model: &str) -> Self {
        Self {
            text,
            provider_used: provider.to_string(),
            model_used: model.to_string(),
        }
    }

    /// Whether this result came from the degradation responder.
    pub fn is_degraded(&self) -> bool {
        self.provider_used == "simulation" && self.model_used == "fallback"
    }
}

/// Why a single provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Timeout,
    Connection,
    Auth,
    Api,
}

/// Tagged outcome of a failed provider call.
///
/// Adapters return this instead of raising; the orchestrator classifies it
/// for pacing and the breaker inspects it for the auth clamp.
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
}

const AUTH_PATTERNS: [&str; 7] = [
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "api key",
    "api_key",
];

impl CallFailure {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Connection,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Auth,
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Api,
            message: message.into(),
        }
    }

    /// Transport-level failures get a longer pause before the next
    /// candidate is tried.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout | FailureKind::Connection)
    }

    /// Whether this failure reads like a credential problem. Matches the
    /// tagged kind first and falls back to message patterns for failures
    /// surfaced by lower layers as plain text.
    pub fn looks_like_auth(&self) -> bool {
        if self.kind == FailureKind::Auth {
            return true;
        }
        let lower = self.message.to_ascii_lowercase();
        AUTH_PATTERNS.iter().any(|p| lower.contains(p))
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
