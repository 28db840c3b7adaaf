use anyhow::Result;
use clap::{Parser, Subcommand};
use palisade::config::TomlConfigSource;
use palisade::llm::{CompletionClient, CompletionRequest, HttpBackendFactory, ProviderId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "palisade", version, about = "Resilient multi-provider completion client")]
struct Cli {
    /// Path to the TOML config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a completion with provider failover.
    Generate {
        prompt: String,

        /// Extra context passed to the provider alongside the prompt.
        #[arg(long)]
        context: Option<String>,

        /// Model to request; falls back to each provider's default when
        /// outside its catalog.
        #[arg(long)]
        model: Option<String>,

        /// Provider to try first.
        #[arg(long)]
        provider: Option<String>,
    },
    /// List providers with a live backend.
    Providers,
    /// Print the diagnostics snapshot as JSON.
    Diagnostics,
    /// Force reinitialization of one provider, or all when omitted.
    Reinit { provider: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(TomlConfigSource::default_path);
    let source = Arc::new(TomlConfigSource::new(config_path));
    let client = CompletionClient::new(source, Arc::new(HttpBackendFactory));

    for (provider, message) in client.initialize().await {
        tracing::warn!(provider = %provider, "initialization: {message}");
    }

    match cli.command {
        Command::Generate {
            prompt,
            context,
            model,
            provider,
        } => {
            let mut request = CompletionRequest::new(prompt);
            if let Some(context) = context {
                request = request.with_context(context);
            }
            if let Some(model) = model {
                request = request.with_model(model);
            }
            if let Some(provider) = provider {
                let id: ProviderId = provider.parse()?;
                request = request.preferring(id);
            }

            let result = client.generate(request).await;
            println!("[{} / {}]", result.provider_used, result.model_used);
            println!("{}", result.text);
        }
        Command::Providers => {
            let available = client.list_available_providers();
            if available.is_empty() {
                println!("(no live providers)");
            }
            for id in available {
                println!("{id}");
            }
        }
        Command::Diagnostics => {
            println!("{}", serde_json::to_string_pretty(&client.diagnostics())?);
        }
        Command::Reinit { provider } => match provider {
            Some(name) => {
                let id: ProviderId = name.parse()?;
                let outcome = client.force_reinitialize(id).await;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            None => {
                let summary = client.force_reinitialize_all().await;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        },
    }

    Ok(())
}
