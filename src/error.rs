use crate::llm::types::ProviderId;
use thiserror::Error;

// ─── Backend construction ────────────────────────────────────────────────────

/// Errors raised while constructing a provider backend.
///
/// Shape problems (`MissingCredential`, `MalformedCredential`) are detected
/// before any network handshake and are not retried; `Init` covers client
/// setup failures that may be transient.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("{provider}: no credential configured")]
    MissingCredential { provider: ProviderId },

    #[error("{provider}: credential is malformed: {reason}")]
    MalformedCredential { provider: ProviderId, reason: String },

    #[error("{provider}: client initialization failed: {message}")]
    Init { provider: ProviderId, message: String },
}

impl ConstructionError {
    /// Deterministic failures that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::MalformedCredential { .. }
        )
    }
}

// ─── Provider id parsing ─────────────────────────────────────────────────────

/// A provider id string that does not name a known backend.
///
/// This is the one error reserved for operator mistakes; it only surfaces
/// from admin paths (CLI arguments, forced reinitialization by name), never
/// from `generate`.
#[derive(Debug, Error)]
#[error("unknown provider id {0:?} (expected one of: openai, anthropic, gemini, openrouter)")]
pub struct UnknownProvider(pub String);
