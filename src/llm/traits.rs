use super::types::{CallFailure, ProviderId};
use crate::error::ConstructionError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Marker appended whenever input had to be cut down to a provider limit.
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Clamp `prompt` + `context` to `max_chars` combined, before dispatch.
///
/// Context is sacrificed first, then the prompt; whichever part was cut gets
/// the truncation marker. Cuts land on char boundaries.
pub fn clamp_input(
    prompt: &str,
    context: Option<&str>,
    max_chars: usize,
) -> (String, Option<String>) {
    let budget = max_chars.saturating_sub(TRUNCATION_MARKER.len());

    let prompt_len = prompt.chars().count();
    let context_len = context.map_or(0, |c| c.chars().count());

    if prompt_len + context_len <= max_chars {
        return (prompt.to_string(), context.map(String::from));
    }

    if prompt_len >= budget {
        // Prompt alone blows the limit; drop the context entirely.
        let mut cut: String = prompt.chars().take(budget).collect();
        cut.push_str(TRUNCATION_MARKER);
        return (cut, None);
    }

    let context_budget = budget - prompt_len;
    let clamped_context = context.map(|c| {
        let mut cut: String = c.chars().take(context_budget).collect();
        cut.push_str(TRUNCATION_MARKER);
        cut
    });
    (prompt.to_string(), clamped_context)
}

/// One live handle to an external completion provider.
///
/// Implementations validate credentials at construction, enforce their own
/// input limits, and return tagged failures instead of raising.
pub trait Backend: Send + Sync {
    /// Which provider this backend speaks to.
    fn id(&self) -> ProviderId;

    /// Models this backend accepts for [`complete`](Self::complete).
    fn models(&self) -> &[&str];

    /// Model used when a request names none (or names one outside the
    /// catalog).
    fn default_model(&self) -> &str;

    /// Overall per-request budget the orchestrator enforces around
    /// [`complete`](Self::complete).
    fn call_budget(&self) -> Duration;

    fn supports_model(&self, model: &str) -> bool {
        self.models().contains(&model)
    }

    /// Issue one completion call. Internal retry policy (up to two attempts
    /// with a linearly increasing delay) is the adapter's own; the caller
    /// sees a single tagged outcome.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        context: Option<&'a str>,
        model: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CallFailure>> + Send + 'a>>;
}

/// Injectable constructor seam between the registry and the concrete
/// adapters, so tests can swap the network out entirely.
pub trait BackendFactory: Send + Sync {
    fn construct(
        &self,
        id: ProviderId,
        credential: &str,
    ) -> Result<Arc<dyn Backend>, ConstructionError>;
}
