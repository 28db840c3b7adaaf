use serde::Serialize;
use std::collections::BTreeMap;

/// Operational snapshot of the whole client: registry, breaker, and config
/// state. Read-only; produced by
/// [`CompletionClient::diagnostics`](super::client::CompletionClient::diagnostics).
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    pub available_providers: Vec<String>,
    pub providers: BTreeMap<String, ProviderDiagnostics>,
    pub initialization_errors: Vec<InitErrorEntry>,
    pub rebuild_in_progress: bool,
    pub last_config_snapshot: Option<ConfigSnapshotInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderDiagnostics {
    /// A credential string is configured.
    pub configured: bool,
    /// The credential also passes the provider's shape check.
    pub credential_valid: bool,
    /// A live backend exists in the registry.
    pub live: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitErrorEntry {
    pub provider: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshotInfo {
    pub captured_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}
