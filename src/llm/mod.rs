// ── Infrastructure ───────────────────────────────────────────────────────────
pub mod breaker;
pub(crate) mod http_client;
pub mod traits;
pub mod types;

// ── Coordination layers ─────────────────────────────────────────────────────
pub mod client;
pub mod diagnostics;
pub mod factory;
pub mod fallback;
pub mod registry;

// ── Provider implementations ────────────────────────────────────────────────
pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod openrouter;

// ── Infrastructure re-exports ───────────────────────────────────────────────
pub use breaker::{BreakerPolicy, FailureState, FailureTracker};
pub use traits::{Backend, BackendFactory, TRUNCATION_MARKER, clamp_input};
pub use types::{CallFailure, CompletionRequest, CompletionResult, FailureKind, ProviderId};

// ── Coordination re-exports ─────────────────────────────────────────────────
pub use client::{CompletionClient, ReinitOutcome, ReinitSummary};
pub use diagnostics::{DiagnosticsSnapshot, ProviderDiagnostics};
pub use factory::{HttpBackendFactory, credential_looks_valid};
pub use fallback::{FALLBACK_MODEL, SIMULATION_PROVIDER, degraded_response};
pub use registry::{ProviderRegistry, RebuildOutcome};

// ── Provider re-exports ─────────────────────────────────────────────────────
pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use openrouter::OpenRouterBackend;
