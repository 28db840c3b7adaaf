use super::traits::{Backend, BackendFactory};
use super::types::ProviderId;
use crate::config::{Config, ReliabilityConfig};
use crate::error::ConstructionError;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type ProviderMap = HashMap<ProviderId, Arc<dyn Backend>>;

/// Result of one rebuild request.
#[derive(Debug)]
pub enum RebuildOutcome {
    /// The pass ran to completion; `errors` lists providers that failed to
    /// initialize.
    Completed { errors: Vec<(ProviderId, String)> },
    /// The pass hit the global rebuild budget; whatever initialized before
    /// the deadline stays live.
    TimedOut { errors: Vec<(ProviderId, String)> },
    /// Another rebuild holds the lock; its result supersedes this request.
    AlreadyRunning,
}

/// Owns the set of live provider backends.
///
/// The live map is published through an `ArcSwap`, so readers never observe
/// a torn list; rebuilds are serialized behind an async mutex and concurrent
/// rebuild requests coalesce into a no-op.
pub struct ProviderRegistry {
    live: ArcSwap<ProviderMap>,
    rebuild_lock: tokio::sync::Mutex<()>,
    rebuilding: AtomicBool,
    init_errors: Mutex<Vec<(ProviderId, String)>>,
    factory: Arc<dyn BackendFactory>,
    reliability: ReliabilityConfig,
}

impl ProviderRegistry {
    pub fn new(factory: Arc<dyn BackendFactory>, reliability: ReliabilityConfig) -> Self {
        Self {
            live: ArcSwap::new(Arc::new(ProviderMap::new())),
            rebuild_lock: tokio::sync::Mutex::new(()),
            rebuilding: AtomicBool::new(false),
            init_errors: Mutex::new(Vec::new()),
            factory,
            reliability,
        }
    }

    pub fn live(&self) -> Arc<ProviderMap> {
        self.live.load_full()
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn Backend>> {
        self.live.load().get(&id).cloned()
    }

    /// Ids with a live backend, in stable order.
    pub fn available(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.live.load().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    /// Error log of the most recent rebuild pass.
    pub fn init_errors(&self) -> Vec<(ProviderId, String)> {
        self.init_errors.lock().map_or_else(|_| Vec::new(), |log| log.clone())
    }

    /// Drop the live backend for `id`, if any.
    pub fn remove(&self, id: ProviderId) {
        self.live.rcu(|map| {
            let mut map = HashMap::clone(map);
            map.remove(&id);
            map
        });
    }

    fn install(&self, id: ProviderId, backend: Arc<dyn Backend>) {
        self.live.rcu(|map| {
            let mut map = HashMap::clone(map);
            map.insert(id, Arc::clone(&backend));
            map
        });
    }

    fn log_init_error(&self, id: ProviderId, message: String) {
        tracing::warn!(provider = %id, "initialization failed: {message}");
        if let Ok(mut log) = self.init_errors.lock() {
            log.push((id, message));
        }
    }

    /// Tear down and reconstruct every configured backend.
    ///
    /// Serialized: a request arriving while another rebuild runs returns
    /// [`RebuildOutcome::AlreadyRunning`] immediately. The pass clears the
    /// live set, then repopulates it provider by provider, publishing each
    /// success as it lands. The whole pass is bounded by the rebuild
    /// budget; on expiry the partial set stays live and every configured
    /// provider that missed the deadline gets a timeout entry in the log.
    pub async fn rebuild(&self, config: &Config) -> RebuildOutcome {
        let Ok(_guard) = self.rebuild_lock.try_lock() else {
            tracing::debug!("rebuild already in progress, coalescing");
            return RebuildOutcome::AlreadyRunning;
        };

        self.rebuilding.store(true, Ordering::SeqCst);
        self.live.store(Arc::new(ProviderMap::new()));
        if let Ok(mut log) = self.init_errors.lock() {
            log.clear();
        }

        let timed_out = tokio::time::timeout(self.reliability.rebuild_timeout(), self.populate(config))
            .await
            .is_err();

        if timed_out {
            tracing::warn!(
                budget_secs = self.reliability.rebuild_timeout_secs,
                "rebuild hit the global budget, keeping the partial live set"
            );
            for id in ProviderId::all() {
                if config.credential(id).is_some() && self.get(id).is_none() {
                    self.log_init_error(
                        id,
                        "registry rebuild timed out before this provider initialized".to_string(),
                    );
                }
            }
        }

        self.rebuilding.store(false, Ordering::SeqCst);
        let errors = self.init_errors();
        if timed_out {
            RebuildOutcome::TimedOut { errors }
        } else {
            RebuildOutcome::Completed { errors }
        }
    }

    async fn populate(&self, config: &Config) {
        for id in ProviderId::all() {
            let Some(credential) = config.credential(id) else {
                tracing::debug!(provider = %id, "no credential configured, skipping");
                continue;
            };

            match self.construct_with_retries(id, credential).await {
                Ok(backend) => {
                    self.install(id, backend);
                    tracing::info!(provider = %id, "backend initialized");
                }
                Err(e) => self.log_init_error(id, e.to_string()),
            }
        }
    }

    async fn construct_with_retries(
        &self,
        id: ProviderId,
        credential: &str,
    ) -> Result<Arc<dyn Backend>, ConstructionError> {
        let attempts = self.reliability.construct_retries.max(1);
        let base = self.reliability.construct_backoff();
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.factory.construct(id, credential) {
                Ok(backend) => return Ok(backend),
                Err(e) => {
                    let permanent = e.is_permanent();
                    last_error = Some(e);
                    if permanent {
                        break;
                    }
                    if attempt + 1 < attempts {
                        let delay = base * 2u32.saturating_pow(attempt);
                        tracing::warn!(
                            provider = %id,
                            attempt = attempt + 1,
                            "construction failed, retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ConstructionError::MissingCredential { provider: id }))
    }

    /// Single construction attempt for forced reinitialization: no retry
    /// loop, installs on success.
    pub fn construct_once(&self, id: ProviderId, config: &Config) -> Result<(), ConstructionError> {
        let credential = config
            .credential(id)
            .ok_or(ConstructionError::MissingCredential { provider: id })?;
        let backend = self.factory.construct(id, credential)?;
        self.install(id, backend);
        Ok(())
    }
}
