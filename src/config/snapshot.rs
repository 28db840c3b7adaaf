use super::Config;
use crate::llm::factory::credential_looks_valid;
use crate::llm::types::ProviderId;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Point-in-time view of the configuration, reduced to the fields the
/// failover path cares about. Snapshots compare by value, excluding the
/// capture timestamps.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// A credential string exists for the provider.
    pub credential_present: BTreeMap<ProviderId, bool>,
    /// The credential also passes the provider's shape check.
    pub credential_valid: BTreeMap<ProviderId, bool>,
    pub default_provider: Option<ProviderId>,
    pub default_model: Option<String>,
    pub captured_at: Instant,
    /// Wall-clock twin of `captured_at`, for diagnostics output.
    pub captured_at_utc: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Derive a snapshot from the current configuration. Never fails; a
    /// provider with no readable credential is simply marked invalid.
    pub fn capture(config: &Config) -> Self {
        let mut credential_present = BTreeMap::new();
        let mut credential_valid = BTreeMap::new();

        for id in ProviderId::all() {
            let key = config.credential(id);
            credential_present.insert(id, key.is_some());
            credential_valid.insert(
                id,
                key.is_some_and(|key| credential_looks_valid(id, key)),
            );
        }

        Self {
            credential_present,
            credential_valid,
            default_provider: config.default_provider_id(),
            default_model: config.default_model.clone(),
            captured_at: Instant::now(),
            captured_at_utc: Utc::now(),
        }
    }

    /// Whether this snapshot represents a configuration change relative to
    /// `previous`.
    ///
    /// No previous snapshot always reads as changed, forcing the bootstrap
    /// rebuild. Snapshots captured within the debounce window of the
    /// previous one are treated as unchanged regardless of content, so a
    /// credential file mid-write cannot trigger a rebuild storm.
    pub fn changed_since(&self, previous: Option<&Self>, debounce: Duration) -> bool {
        let Some(previous) = previous else {
            tracing::debug!("no prior config snapshot, treating as changed");
            return true;
        };

        let elapsed = self.captured_at.saturating_duration_since(previous.captured_at);
        if elapsed < debounce {
            return false;
        }

        self.differs_from(previous)
    }

    fn differs_from(&self, previous: &Self) -> bool {
        let mut changed_field = None;

        if self.credential_valid != previous.credential_valid {
            changed_field = Some("credential validity");
        } else if self.credential_present != previous.credential_present {
            changed_field = Some("credential presence");
        } else if self.default_provider != previous.default_provider {
            changed_field = Some("default provider");
        } else if self.default_model != previous.default_model {
            changed_field = Some("default model");
        }

        match changed_field {
            Some(field) => {
                tracing::debug!(field, "configuration changed");
                true
            }
            None => false,
        }
    }

    pub fn is_valid(&self, id: ProviderId) -> bool {
        self.credential_valid.get(&id).copied().unwrap_or(false)
    }

    pub fn is_present(&self, id: ProviderId) -> bool {
        self.credential_present.get(&id).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKeys;

    fn config_with(id: ProviderId, key: &str) -> Config {
        let mut providers = ProviderKeys::default();
        providers.set(id, Some(key.into()));
        Config {
            providers,
            ..Config::default()
        }
    }

    fn backdate(mut snapshot: ConfigSnapshot, by: Duration) -> ConfigSnapshot {
        snapshot.captured_at = Instant::now() - by;
        snapshot
    }

    #[test]
    fn capture_flags_shape_validity() {
        let snapshot = ConfigSnapshot::capture(&config_with(
            ProviderId::Openai,
            "sk-test-0123456789abcdef",
        ));
        assert!(snapshot.is_present(ProviderId::Openai));
        assert!(snapshot.is_valid(ProviderId::Openai));
        assert!(!snapshot.is_present(ProviderId::Anthropic));
        assert!(!snapshot.is_valid(ProviderId::Anthropic));
    }

    #[test]
    fn malformed_key_is_present_but_invalid() {
        let snapshot = ConfigSnapshot::capture(&config_with(ProviderId::Openai, "not-a-key"));
        assert!(snapshot.is_present(ProviderId::Openai));
        assert!(!snapshot.is_valid(ProviderId::Openai));
    }

    #[test]
    fn first_snapshot_reads_as_changed() {
        let snapshot = ConfigSnapshot::capture(&Config::default());
        assert!(snapshot.changed_since(None, Duration::from_secs(5)));
    }

    #[test]
    fn within_debounce_window_reads_unchanged() {
        let previous = ConfigSnapshot::capture(&Config::default());
        // Different content, captured immediately after.
        let current = ConfigSnapshot::capture(&config_with(
            ProviderId::Openai,
            "sk-test-0123456789abcdef",
        ));
        assert!(!current.changed_since(Some(&previous), Duration::from_secs(5)));
    }

    #[test]
    fn credential_change_detected_past_debounce() {
        let previous = backdate(
            ConfigSnapshot::capture(&Config::default()),
            Duration::from_secs(6),
        );
        let current = ConfigSnapshot::capture(&config_with(
            ProviderId::Openai,
            "sk-test-0123456789abcdef",
        ));
        assert!(current.changed_since(Some(&previous), Duration::from_secs(5)));
    }

    #[test]
    fn identical_content_reads_unchanged_past_debounce() {
        let config = config_with(ProviderId::Openai, "sk-test-0123456789abcdef");
        let previous = backdate(ConfigSnapshot::capture(&config), Duration::from_secs(6));
        let current = ConfigSnapshot::capture(&config);
        assert!(!current.changed_since(Some(&previous), Duration::from_secs(5)));
    }

    #[test]
    fn default_model_change_is_a_change() {
        let previous = backdate(
            ConfigSnapshot::capture(&Config::default()),
            Duration::from_secs(6),
        );
        let current = ConfigSnapshot::capture(&Config {
            default_model: Some("gpt-4o".into()),
            ..Config::default()
        });
        assert!(current.changed_since(Some(&previous), Duration::from_secs(5)));
    }

    #[test]
    fn rotation_between_valid_keys_is_not_a_change() {
        // The snapshot tracks validity, not key bytes; swapping one valid
        // key for another does not trigger a rebuild.
        let previous = backdate(
            ConfigSnapshot::capture(&config_with(
                ProviderId::Openai,
                "sk-test-0123456789abcdef",
            )),
            Duration::from_secs(6),
        );
        let current = ConfigSnapshot::capture(&config_with(
            ProviderId::Openai,
            "sk-live-fedcba9876543210",
        ));
        assert!(!current.changed_since(Some(&previous), Duration::from_secs(5)));
    }
}
