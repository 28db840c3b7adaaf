//! Shared mock provider stack for the integration suite.
//!
//! `MockFactory` mirrors the real factory's contract: credential shape is
//! validated before a backend exists (any key starting with `valid`
//! passes), and each constructed backend consults a shared per-provider
//! script to decide whether a call succeeds.

use palisade::config::{Config, ReliabilityConfig};
use palisade::error::ConstructionError;
use palisade::llm::{Backend, BackendFactory, CallFailure, ProviderId};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-provider behavior script, shared between the test body and the
/// backends the factory hands out.
#[derive(Default)]
pub struct ProviderScript {
    /// Completion calls made against this provider.
    pub calls: AtomicU32,
    /// Backends constructed for this provider.
    pub constructed: AtomicU32,
    queued_failures: Mutex<VecDeque<CallFailure>>,
}

impl ProviderScript {
    /// Queue `count` copies of `failure`; calls pop the queue and fail
    /// until it drains, then succeed.
    pub fn fail_next(&self, count: usize, failure: &CallFailure) {
        let mut queue = self.queued_failures.lock().unwrap();
        for _ in 0..count {
            queue.push_back(failure.clone());
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn construct_count(&self) -> u32 {
        self.constructed.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<CallFailure> {
        self.queued_failures.lock().unwrap().pop_front()
    }
}

pub struct MockBackend {
    id: ProviderId,
    script: Arc<ProviderScript>,
}

impl Backend for MockBackend {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn models(&self) -> &[&str] {
        &["mock-small", "mock-large"]
    }

    fn default_model(&self) -> &str {
        "mock-small"
    }

    fn call_budget(&self) -> Duration {
        Duration::from_secs(45)
    }

    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
        _context: Option<&'a str>,
        _model: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CallFailure>> + Send + 'a>> {
        Box::pin(async move {
            self.script.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.next_failure() {
                Some(failure) => Err(failure),
                None => Ok(format!("{} says hello", self.id)),
            }
        })
    }
}

pub struct MockFactory {
    scripts: HashMap<ProviderId, Arc<ProviderScript>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            scripts: ProviderId::all()
                .map(|id| (id, Arc::new(ProviderScript::default())))
                .collect(),
        }
    }

    pub fn script(&self, id: ProviderId) -> Arc<ProviderScript> {
        Arc::clone(&self.scripts[&id])
    }
}

impl BackendFactory for MockFactory {
    fn construct(
        &self,
        id: ProviderId,
        credential: &str,
    ) -> Result<Arc<dyn Backend>, ConstructionError> {
        if !credential.starts_with("valid") {
            return Err(ConstructionError::MalformedCredential {
                provider: id,
                reason: "expected \"valid\" prefix".into(),
            });
        }
        let script = self.script(id);
        script.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBackend { id, script }))
    }
}

/// Config with the given credentials and test-friendly pacing: no
/// inter-candidate pauses, no construction backoff, fast rebuild polling.
/// The debounce window keeps its normative 5s default.
pub fn test_config(keys: &[(ProviderId, &str)]) -> Config {
    let mut config = Config {
        reliability: ReliabilityConfig {
            construct_backoff_secs: 0,
            transport_pause_secs: 0,
            failure_pause_secs: 0,
            rebuild_poll_millis: 1,
            ..ReliabilityConfig::default()
        },
        ..Config::default()
    };
    for (id, key) in keys {
        config.providers.set(*id, Some((*key).to_string()));
    }
    config
}
