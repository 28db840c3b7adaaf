use super::breaker::FailureTracker;
use super::diagnostics::{
    ConfigSnapshotInfo, DiagnosticsSnapshot, InitErrorEntry, ProviderDiagnostics,
};
use super::fallback::{self, ProviderStanding};
use super::registry::{ProviderRegistry, RebuildOutcome};
use super::traits::{Backend, BackendFactory};
use super::types::{CallFailure, CompletionRequest, CompletionResult, ProviderId};
use crate::config::snapshot::ConfigSnapshot;
use crate::config::{ConfigSource, ReliabilityConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const SELF_TEST_PROMPT: &str = "Reply with one word to confirm you are reachable.";

/// Result of a forced reinitialization of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ReinitOutcome {
    pub provider: ProviderId,
    pub success: bool,
    /// Whether the post-reinit self-test completion went through this
    /// provider.
    pub tested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate result of reinitializing every known provider.
#[derive(Debug, Clone, Serialize)]
pub struct ReinitSummary {
    pub outcomes: Vec<ReinitOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Resilient multi-provider completion client.
///
/// One long-lived instance owns the provider registry, the failure tracker,
/// and the last configuration snapshot. `generate` never errors: every
/// failure path resolves to a degraded [`CompletionResult`] carrying the
/// `"simulation"` sentinel.
///
/// Construction performs no I/O; call [`initialize`](Self::initialize) to
/// build the registry before serving requests (a first `generate` will also
/// bootstrap itself if needed).
pub struct CompletionClient {
    source: Arc<dyn ConfigSource>,
    registry: ProviderRegistry,
    breaker: Mutex<FailureTracker>,
    /// Snapshot the debounce window is measured against.
    last_snapshot: Mutex<Option<ConfigSnapshot>>,
    /// Snapshot of the last configuration that produced a complete rebuild.
    last_good: Mutex<Option<ConfigSnapshot>>,
    reliability: ReliabilityConfig,
}

impl CompletionClient {
    pub fn new(source: Arc<dyn ConfigSource>, factory: Arc<dyn BackendFactory>) -> Self {
        let reliability = source.load().reliability;
        Self {
            source,
            registry: ProviderRegistry::new(factory, reliability.clone()),
            breaker: Mutex::new(FailureTracker::new(reliability.breaker_policy())),
            last_snapshot: Mutex::new(None),
            last_good: Mutex::new(None),
            reliability,
        }
    }

    /// Explicit bootstrap: build the registry from the current
    /// configuration. Returns the initialization error log.
    pub async fn initialize(&self) -> Vec<(ProviderId, String)> {
        let config = self.source.load();
        let snapshot = ConfigSnapshot::capture(&config);
        let outcome = self.run_rebuild(&config).await;

        *self.last_snapshot.lock().expect("snapshot lock poisoned") = Some(snapshot.clone());
        match &outcome {
            RebuildOutcome::Completed { errors } => {
                *self.last_good.lock().expect("snapshot lock poisoned") = Some(snapshot);
                errors.clone()
            }
            RebuildOutcome::TimedOut { errors } => errors.clone(),
            RebuildOutcome::AlreadyRunning => Vec::new(),
        }
    }

    /// Generate a completion, falling through providers in priority order.
    /// Documented to never raise; all failures resolve to a degraded
    /// result.
    pub async fn generate(&self, request: CompletionRequest) -> CompletionResult {
        let prompt = request.prompt.trim().to_string();
        if prompt.is_empty() {
            return self.degrade(
                &request.prompt,
                Some("prompt was empty after trimming whitespace"),
            );
        }

        if !self.await_rebuild_window().await {
            tracing::warn!("rebuild still running after wait budget, degrading");
            return self.degrade(&prompt, Some("provider registry is still rebuilding"));
        }

        if !self.refresh_config().await {
            return self.degrade(&prompt, Some("no usable provider configuration"));
        }

        let candidates = self.candidate_order(request.preferred_provider);
        if candidates.is_empty() {
            return self.degrade(&prompt, None);
        }

        let configured_default_model = self
            .last_snapshot
            .lock()
            .expect("snapshot lock poisoned")
            .as_ref()
            .and_then(|s| s.default_model.clone());

        let total = candidates.len();
        let mut last_error: Option<String> = None;

        for (index, backend) in candidates.into_iter().enumerate() {
            let id = backend.id();

            if self.breaker.lock().expect("breaker lock poisoned").is_open(id) {
                tracing::debug!(provider = %id, "breaker open, skipping");
                continue;
            }

            let model = resolve_model(
                backend.as_ref(),
                request.model.as_deref(),
                configured_default_model.as_deref(),
            );

            let attempt = tokio::time::timeout(
                backend.call_budget(),
                backend.complete(&prompt, request.context.as_deref(), &model),
            )
            .await;

            let failure = match attempt {
                Ok(Ok(text)) => {
                    self.breaker
                        .lock()
                        .expect("breaker lock poisoned")
                        .record_success(id);
                    tracing::info!(provider = %id, model = %model, "completion served");
                    return CompletionResult::from_provider(text, id, &model);
                }
                Ok(Err(failure)) => failure,
                Err(_) => CallFailure::timeout(format!(
                    "{id} exceeded its {:?} call budget",
                    backend.call_budget()
                )),
            };

            tracing::warn!(
                provider = %id,
                kind = %failure.kind,
                "candidate failed, falling through: {}",
                failure.message
            );
            self.breaker
                .lock()
                .expect("breaker lock poisoned")
                .record_failure(id, &failure);
            last_error = Some(failure.to_string());

            if index + 1 < total {
                let pause = if failure.is_transport() {
                    self.reliability.transport_pause()
                } else {
                    self.reliability.failure_pause()
                };
                tokio::time::sleep(pause).await;
            }
        }

        self.degrade(&prompt, last_error.as_deref())
    }

    pub fn list_available_providers(&self) -> Vec<ProviderId> {
        self.registry.available()
    }

    /// Drop and reconstruct one provider (single attempt), then self-test
    /// it through the full failover path. Never raises; failures come back
    /// in the outcome.
    pub async fn force_reinitialize(&self, id: ProviderId) -> ReinitOutcome {
        self.registry.remove(id);
        self.breaker.lock().expect("breaker lock poisoned").reset(id);

        let config = self.source.load();
        if let Err(e) = self.registry.construct_once(id, &config) {
            return ReinitOutcome {
                provider: id,
                success: false,
                tested: false,
                detail: Some(e.to_string()),
            };
        }

        let probe = CompletionRequest::new(SELF_TEST_PROMPT).preferring(id);
        let result = self.generate(probe).await;
        let tested = result.provider_used == id.to_string();
        ReinitOutcome {
            provider: id,
            success: true,
            tested,
            detail: (!tested).then(|| {
                format!(
                    "self-test was answered by {:?} instead",
                    result.provider_used
                )
            }),
        }
    }

    pub async fn force_reinitialize_all(&self) -> ReinitSummary {
        let mut outcomes = Vec::with_capacity(4);
        for id in ProviderId::all() {
            outcomes.push(self.force_reinitialize(id).await);
        }
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        ReinitSummary {
            outcomes,
            succeeded,
            failed,
        }
    }

    /// Read-only operational snapshot across registry, breaker, and config
    /// state.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        let live = self.registry.live();
        let snapshot = self.last_snapshot.lock().expect("snapshot lock poisoned");
        let breaker = self.breaker.lock().expect("breaker lock poisoned");

        let mut providers = BTreeMap::new();
        for id in ProviderId::all() {
            providers.insert(
                id.to_string(),
                ProviderDiagnostics {
                    configured: snapshot.as_ref().is_some_and(|s| s.is_present(id)),
                    credential_valid: snapshot.as_ref().is_some_and(|s| s.is_valid(id)),
                    live: live.contains_key(&id),
                    consecutive_failures: breaker.failures(id),
                    last_error: breaker.last_error(id),
                },
            );
        }

        DiagnosticsSnapshot {
            available_providers: self
                .registry
                .available()
                .iter()
                .map(ToString::to_string)
                .collect(),
            providers,
            initialization_errors: self
                .registry
                .init_errors()
                .into_iter()
                .map(|(provider, message)| InitErrorEntry {
                    provider: provider.to_string(),
                    message,
                })
                .collect(),
            rebuild_in_progress: self.registry.is_rebuilding(),
            last_config_snapshot: self
                .last_good
                .lock()
                .expect("snapshot lock poisoned")
                .as_ref()
                .map(|s| ConfigSnapshotInfo {
                    captured_at: s.captured_at_utc.to_rfc3339(),
                    default_provider: s.default_provider.map(|p| p.to_string()),
                    default_model: s.default_model.clone(),
                }),
        }
    }

    // ── Internals ────────────────────────────────────────────────

    /// Run a rebuild and reset the breaker for every backend that came up.
    async fn run_rebuild(&self, config: &crate::config::Config) -> RebuildOutcome {
        let outcome = self.registry.rebuild(config).await;
        if matches!(
            outcome,
            RebuildOutcome::Completed { .. } | RebuildOutcome::TimedOut { .. }
        ) {
            let mut breaker = self.breaker.lock().expect("breaker lock poisoned");
            for id in self.registry.available() {
                breaker.reset(id);
            }
        }
        outcome
    }

    /// Bounded wait on an in-flight rebuild. True once no rebuild is
    /// running; false when the wait budget ran out first.
    async fn await_rebuild_window(&self) -> bool {
        if !self.registry.is_rebuilding() {
            return true;
        }
        let deadline = tokio::time::Instant::now() + self.reliability.rebuild_wait();
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.reliability.rebuild_poll()).await;
            if !self.registry.is_rebuilding() {
                return true;
            }
        }
        false
    }

    /// Detect a (debounced) configuration change and rebuild if needed.
    /// Returns false only when the client should degrade instead of
    /// consulting candidates.
    async fn refresh_config(&self) -> bool {
        let config = self.source.load();
        let snapshot = ConfigSnapshot::capture(&config);

        let changed = {
            let last = self.last_snapshot.lock().expect("snapshot lock poisoned");
            snapshot.changed_since(last.as_ref(), self.reliability.debounce())
        };
        if !changed {
            return true;
        }

        match self.run_rebuild(&config).await {
            RebuildOutcome::Completed { .. } => {
                let mut last = self.last_snapshot.lock().expect("snapshot lock poisoned");
                *last = Some(snapshot.clone());
                *self.last_good.lock().expect("snapshot lock poisoned") = Some(snapshot);
                true
            }
            RebuildOutcome::TimedOut { .. } => {
                *self.last_snapshot.lock().expect("snapshot lock poisoned") = Some(snapshot);
                let has_good = self
                    .last_good
                    .lock()
                    .expect("snapshot lock poisoned")
                    .is_some();
                has_good && !self.registry.available().is_empty()
            }
            // Another caller is already rebuilding; wait for it, then
            // proceed against whatever set it publishes.
            RebuildOutcome::AlreadyRunning => self.await_rebuild_window().await,
        }
    }

    /// Priority order: preferred, then configured default, then the rest
    /// ascending by consecutive failures.
    fn candidate_order(&self, preferred: Option<ProviderId>) -> Vec<Arc<dyn Backend>> {
        let live = self.registry.live();
        let mut order: Vec<ProviderId> = Vec::new();

        if let Some(id) = preferred
            && live.contains_key(&id)
        {
            order.push(id);
        }

        let default = self
            .last_snapshot
            .lock()
            .expect("snapshot lock poisoned")
            .as_ref()
            .and_then(|s| s.default_provider);
        if let Some(id) = default
            && live.contains_key(&id)
            && !order.contains(&id)
        {
            order.push(id);
        }

        let mut rest: Vec<ProviderId> = live
            .keys()
            .copied()
            .filter(|id| !order.contains(id))
            .collect();
        {
            let breaker = self.breaker.lock().expect("breaker lock poisoned");
            rest.sort_by_key(|id| (breaker.failures(*id), *id));
        }
        order.extend(rest);

        order
            .into_iter()
            .filter_map(|id| live.get(&id).cloned())
            .collect()
    }

    fn provider_standings(&self) -> Vec<(ProviderId, ProviderStanding)> {
        let live = self.registry.live();
        let snapshot = self.last_snapshot.lock().expect("snapshot lock poisoned");
        ProviderId::all()
            .map(|id| {
                let standing = if live.contains_key(&id) {
                    ProviderStanding::Ready
                } else if snapshot.as_ref().is_some_and(|s| s.is_present(id)) {
                    ProviderStanding::Configured
                } else {
                    ProviderStanding::Unconfigured
                };
                (id, standing)
            })
            .collect()
    }

    fn degrade(&self, prompt: &str, last_error: Option<&str>) -> CompletionResult {
        fallback::degraded_response(prompt, last_error, &self.provider_standings())
    }
}

/// Explicit request model when the provider's catalog has it, otherwise the
/// configured default when the catalog has that, otherwise the provider's
/// own default.
fn resolve_model(
    backend: &dyn Backend,
    requested: Option<&str>,
    configured_default: Option<&str>,
) -> String {
    if let Some(model) = requested
        && backend.supports_model(model)
    {
        return model.to_string();
    }
    if let Some(model) = configured_default
        && backend.supports_model(model)
    {
        return model.to_string();
    }
    backend.default_model().to_string()
}
