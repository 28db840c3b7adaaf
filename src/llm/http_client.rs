use super::types::{CallFailure, ProviderId};
use std::future::Future;
use std::time::Duration;

/// Hard cap on stored/logged API error text. Provider error bodies can be
/// large and may echo request fragments; everything downstream (breaker
/// state, diagnostics, fallback text) sees at most this much.
const MAX_API_ERROR_CHARS: usize = 200;

/// Attempts each adapter makes internally before surfacing a failure.
pub(crate) const CALL_ATTEMPTS: u32 = 2;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared `reqwest` client with the adapter's fixed per-attempt timeout.
pub(crate) fn build_provider_client(attempt_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(attempt_timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Truncate an API error body to a bounded, single-line message.
pub(crate) fn sanitize_api_error(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_API_ERROR_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(MAX_API_ERROR_CHARS).collect();
    cut.push('…');
    cut
}

pub(crate) fn map_transport_error(provider: ProviderId, error: &reqwest::Error) -> CallFailure {
    if error.is_timeout() {
        CallFailure::timeout(format!("{provider} request timed out: {error}"))
    } else if error.is_connect() {
        CallFailure::connection(format!("{provider} connection failed: {error}"))
    } else {
        CallFailure::api(format!("{provider} request failed: {error}"))
    }
}

/// Convert a non-2xx response into a tagged failure, consuming the body.
pub(crate) async fn failure_from_response(
    provider: ProviderId,
    response: reqwest::Response,
) -> CallFailure {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!(
        "{provider} API error ({status}): {}",
        sanitize_api_error(&body)
    );

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        CallFailure::auth(message)
    } else {
        CallFailure::api(message)
    }
}

/// Run `op` up to [`CALL_ATTEMPTS`] times with a linearly increasing delay
/// (`base_delay` times the attempt number) between attempts.
pub(crate) async fn call_with_retry<F, Fut>(
    provider: ProviderId,
    base_delay: Duration,
    op: F,
) -> Result<String, CallFailure>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String, CallFailure>>,
{
    let mut last_failure = None;

    for attempt in 1..=CALL_ATTEMPTS {
        match op().await {
            Ok(text) => {
                if attempt > 1 {
                    tracing::info!(provider = %provider, attempt, "provider recovered on retry");
                }
                return Ok(text);
            }
            Err(failure) => {
                tracing::warn!(
                    provider = %provider,
                    attempt,
                    kind = %failure.kind,
                    "provider call failed: {}",
                    failure.message
                );
                last_failure = Some(failure);
                if attempt < CALL_ATTEMPTS {
                    tokio::time::sleep(base_delay * attempt).await;
                }
            }
        }
    }

    Err(last_failure
        .unwrap_or_else(|| CallFailure::api(format!("{provider}: no attempt was made"))))
}
