pub mod snapshot;

use crate::llm::breaker::BreakerPolicy;
use crate::llm::types::ProviderId;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ── Schema ───────────────────────────────────────────────────────

/// Root configuration for the completion client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProviderKeys,

    /// Provider consulted after the per-request preference.
    #[serde(default)]
    pub default_provider: Option<String>,

    #[serde(default)]
    pub default_model: Option<String>,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

impl Config {
    pub fn credential(&self, id: ProviderId) -> Option<&str> {
        self.providers.get(id)
    }

    /// Parse the configured default provider, logging and ignoring an
    /// unknown id.
    pub fn default_provider_id(&self) -> Option<ProviderId> {
        let name = self.default_provider.as_deref()?;
        match name.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("ignoring configured default provider: {e}");
                None
            }
        }
    }
}

/// Per-provider API keys. Absent means unconfigured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderKeys {
    #[serde(default)]
    pub openai: Option<String>,
    #[serde(default)]
    pub anthropic: Option<String>,
    #[serde(default)]
    pub gemini: Option<String>,
    #[serde(default)]
    pub openrouter: Option<String>,
}

impl ProviderKeys {
    pub fn get(&self, id: ProviderId) -> Option<&str> {
        let key = match id {
            ProviderId::Openai => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
            ProviderId::Openrouter => &self.openrouter,
        };
        key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn set(&mut self, id: ProviderId, key: Option<String>) {
        let slot = match id {
            ProviderId::Openai => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Gemini => &mut self.gemini,
            ProviderId::Openrouter => &mut self.openrouter,
        };
        *slot = key;
    }
}

// ── Reliability / failover tunables ──────────────────────────────

/// Timing and threshold knobs for the failover path. Defaults are the
/// normative values; none of them is load-bearing for correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Config changes observed closer together than this are ignored.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Consecutive failures at which a provider's breaker opens.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// Auth failures pushing the count past this value get clamped.
    #[serde(default = "default_auth_clamp_after")]
    pub auth_clamp_after: u32,

    /// The value an auth failure clamps the count to.
    #[serde(default = "default_auth_clamp_to")]
    pub auth_clamp_to: u32,

    /// Construction attempts per provider during a rebuild.
    #[serde(default = "default_construct_retries")]
    pub construct_retries: u32,

    /// Base delay (s) for exponential construction backoff.
    #[serde(default = "default_construct_backoff_secs")]
    pub construct_backoff_secs: u64,

    /// Budget (s) for one whole rebuild pass.
    #[serde(default = "default_rebuild_timeout_secs")]
    pub rebuild_timeout_secs: u64,

    /// How long a `generate` call waits on an in-flight rebuild.
    #[serde(default = "default_rebuild_wait_secs")]
    pub rebuild_wait_secs: u64,

    /// Poll interval (ms) while waiting on an in-flight rebuild.
    #[serde(default = "default_rebuild_poll_millis")]
    pub rebuild_poll_millis: u64,

    /// Pause (s) after a connection/timeout failure before the next
    /// candidate.
    #[serde(default = "default_transport_pause_secs")]
    pub transport_pause_secs: u64,

    /// Pause (s) after any other failure before the next candidate.
    #[serde(default = "default_failure_pause_secs")]
    pub failure_pause_secs: u64,
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_auth_clamp_after() -> u32 {
    3
}

fn default_auth_clamp_to() -> u32 {
    2
}

fn default_construct_retries() -> u32 {
    5
}

fn default_construct_backoff_secs() -> u64 {
    2
}

fn default_rebuild_timeout_secs() -> u64 {
    60
}

fn default_rebuild_wait_secs() -> u64 {
    30
}

fn default_rebuild_poll_millis() -> u64 {
    250
}

fn default_transport_pause_secs() -> u64 {
    3
}

fn default_failure_pause_secs() -> u64 {
    1
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            breaker_threshold: default_breaker_threshold(),
            auth_clamp_after: default_auth_clamp_after(),
            auth_clamp_to: default_auth_clamp_to(),
            construct_retries: default_construct_retries(),
            construct_backoff_secs: default_construct_backoff_secs(),
            rebuild_timeout_secs: default_rebuild_timeout_secs(),
            rebuild_wait_secs: default_rebuild_wait_secs(),
            rebuild_poll_millis: default_rebuild_poll_millis(),
            transport_pause_secs: default_transport_pause_secs(),
            failure_pause_secs: default_failure_pause_secs(),
        }
    }
}

impl ReliabilityConfig {
    pub fn breaker_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            open_threshold: self.breaker_threshold,
            auth_clamp_after: self.auth_clamp_after,
            auth_clamp_to: self.auth_clamp_to,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_secs(self.rebuild_timeout_secs)
    }

    pub fn rebuild_wait(&self) -> Duration {
        Duration::from_secs(self.rebuild_wait_secs)
    }

    pub fn rebuild_poll(&self) -> Duration {
        Duration::from_millis(self.rebuild_poll_millis)
    }

    pub fn construct_backoff(&self) -> Duration {
        Duration::from_secs(self.construct_backoff_secs)
    }

    pub fn transport_pause(&self) -> Duration {
        Duration::from_secs(self.transport_pause_secs)
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_secs(self.failure_pause_secs)
    }
}

// ── Sources ──────────────────────────────────────────────────────

/// Where the client reads its configuration from. `load` never fails:
/// unreadable config degrades to the default (all providers
/// unconfigured).
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Config;
}

/// TOML file source with environment-variable fill-in for missing keys.
pub struct TomlConfigSource {
    path: PathBuf,
}

impl TomlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "palisade")
            .map_or_else(|| PathBuf::from("palisade.toml"), |dirs| {
                dirs.config_dir().join("config.toml")
            })
    }
}

impl ConfigSource for TomlConfigSource {
    fn load(&self) -> Config {
        let mut config = match std::fs::read_to_string(&self.path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "config parse failed: {e}");
                    Config::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "config read failed: {e}");
                Config::default()
            }
        };
        apply_env_overrides(&mut config);
        config
    }
}

/// Credentials absent from the file are filled from the environment, in
/// project-specific-first order. File values always win.
fn apply_env_overrides(config: &mut Config) {
    let candidates: [(ProviderId, [&str; 2]); 4] = [
        (
            ProviderId::Openai,
            ["PALISADE_OPENAI_API_KEY", "OPENAI_API_KEY"],
        ),
        (
            ProviderId::Anthropic,
            ["PALISADE_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"],
        ),
        (
            ProviderId::Gemini,
            ["PALISADE_GEMINI_API_KEY", "GEMINI_API_KEY"],
        ),
        (
            ProviderId::Openrouter,
            ["PALISADE_OPENROUTER_API_KEY", "OPENROUTER_API_KEY"],
        ),
    ];

    for (id, vars) in candidates {
        if config.providers.get(id).is_some() {
            continue;
        }
        for var in vars {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim();
                if !value.is_empty() {
                    config.providers.set(id, Some(value.to_string()));
                    break;
                }
            }
        }
    }

    if config.default_provider.is_none()
        && let Ok(value) = std::env::var("PALISADE_DEFAULT_PROVIDER")
        && !value.trim().is_empty()
    {
        config.default_provider = Some(value.trim().to_string());
    }
    if config.default_model.is_none()
        && let Ok(value) = std::env::var("PALISADE_DEFAULT_MODEL")
        && !value.trim().is_empty()
    {
        config.default_model = Some(value.trim().to_string());
    }
}

/// In-memory source with hot-swap, for tests and embedders that manage
/// configuration themselves.
pub struct StaticConfigSource {
    inner: ArcSwap<Config>,
}

impl StaticConfigSource {
    pub fn new(config: Config) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(config)),
        }
    }

    /// Replace the configuration; picked up by the next `load`.
    pub fn store(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Config {
        self.inner.load().as_ref().clone()
    }
}
