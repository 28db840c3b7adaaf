use super::types::{CompletionResult, ProviderId};

/// Sentinel provider id marking a degraded response.
pub const SIMULATION_PROVIDER: &str = "simulation";
/// Sentinel model id marking a degraded response.
pub const FALLBACK_MODEL: &str = "fallback";

const PROMPT_ECHO_CHARS: usize = 80;

/// Per-provider standing, rendered into the fallback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStanding {
    /// Live backend, would normally serve requests.
    Ready,
    /// Credential configured but no live backend right now.
    Configured,
    /// No credential at all.
    Unconfigured,
}

impl ProviderStanding {
    fn label(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Configured => "configured",
            Self::Unconfigured => "unconfigured",
        }
    }
}

/// Build the guaranteed non-error response for a request no provider could
/// serve. Pure and total: any prompt, any error text, any status list.
pub fn degraded_response(
    prompt: &str,
    last_error: Option<&str>,
    statuses: &[(ProviderId, ProviderStanding)],
) -> CompletionResult {
    let mut text = String::from(
        "No completion provider is currently able to serve this request, \
         so this is a simulated response.\n",
    );

    text.push_str(&format!("\nRequest: \"{}\"\n", echo_prompt(prompt)));

    if statuses.is_empty() {
        text.push_str("Provider status: none known\n");
    } else {
        let rendered: Vec<String> = statuses
            .iter()
            .map(|(id, standing)| format!("{id}: {}", standing.label()))
            .collect();
        text.push_str(&format!("Provider status: {}\n", rendered.join(", ")));
    }

    if let Some(error) = last_error {
        text.push_str(&format!("Last error: {error}\n"));
    }

    text.push_str(
        "\nLive completions resume automatically once a provider becomes available.",
    );

    CompletionResult {
        text,
        provider_used: SIMULATION_PROVIDER.to_string(),
        model_used: FALLBACK_MODEL.to_string(),
    }
}

fn echo_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "(empty)".to_string();
    }
    if trimmed.chars().count() <= PROMPT_ECHO_CHARS {
        return trimmed.to_string();
    }
    let mut echo: String = trimmed.chars().take(PROMPT_ECHO_CHARS).collect();
    echo.push('…');
    echo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_the_sentinel_pair() {
        let result = degraded_response("hello", None, &[]);
        assert_eq!(result.provider_used, SIMULATION_PROVIDER);
        assert_eq!(result.model_used, FALLBACK_MODEL);
        assert!(result.is_degraded());
    }

    #[test]
    fn echoes_a_truncated_prompt() {
        let long = "word ".repeat(100);
        let result = degraded_response(&long, None, &[]);
        assert!(result.text.contains('…'));
        assert!(result.text.contains("word"));
    }

    #[test]
    fn renders_provider_standings() {
        let statuses = [
            (ProviderId::Openai, ProviderStanding::Ready),
            (ProviderId::Anthropic, ProviderStanding::Configured),
            (ProviderId::Gemini, ProviderStanding::Unconfigured),
        ];
        let result = degraded_response("hi", None, &statuses);
        assert!(result.text.contains("openai: ready"));
        assert!(result.text.contains("anthropic: configured"));
        assert!(result.text.contains("gemini: unconfigured"));
    }

    #[test]
    fn includes_last_error_when_given() {
        let result = degraded_response("hi", Some("connection: refused"), &[]);
        assert!(result.text.contains("Last error: connection: refused"));

        let without = degraded_response("hi", None, &[]);
        assert!(!without.text.contains("Last error"));
    }

    #[test]
    fn total_over_hostile_input() {
        let hostile = "\u{0}\u{202e}🦀".repeat(1000);
        let result = degraded_response(&hostile, Some(&hostile), &[]);
        assert!(result.is_degraded());
        assert!(!result.text.is_empty());
    }

    #[test]
    fn empty_prompt_is_marked() {
        let result = degraded_response("   ", None, &[]);
        assert!(result.text.contains("(empty)"));
    }
}
