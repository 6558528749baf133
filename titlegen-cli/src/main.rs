mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use titlegen::{JsonConfigStore, ProviderId};

#[derive(Parser)]
#[command(name = "titlegen", version, about = "Generate document titles with LLM provider failover")]
struct Cli {
    /// Config file (default: ~/.titlegen/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a title for a file, or stdin when no file is given
    Generate {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Check connectivity with a provider's configured credential
    Test { provider: ProviderId },

    /// List providers, key status, failure counters and the try order
    Providers,

    /// Edit the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the stored config with API keys masked
    Show,

    /// Set the API key, base URL or model for a provider
    SetCredential {
        provider: ProviderId,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },

    /// Choose the primary provider and its fallbacks
    SetPrimary {
        provider: ProviderId,
        /// Comma-separated fallback providers, in order
        #[arg(long, value_delimiter = ',')]
        fallbacks: Option<Vec<ProviderId>>,
        /// Promote a fallback to primary after it succeeds
        #[arg(long)]
        auto_switch: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "titlegen=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = match cli.config {
        Some(path) => JsonConfigStore::new(path),
        None => JsonConfigStore::default_path(),
    };

    match cli.command {
        Commands::Generate { file } => {
            commands::run_generate(&store, file.as_deref()).await?;
        }
        Commands::Test { provider } => {
            commands::run_test(&store, provider).await?;
        }
        Commands::Providers => {
            commands::run_providers(&store)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::run_show(&store)?,
            ConfigAction::SetCredential {
                provider,
                api_key,
                base_url,
                model,
            } => commands::run_set_credential(&store, provider, api_key, base_url, model)?,
            ConfigAction::SetPrimary {
                provider,
                fallbacks,
                auto_switch,
            } => commands::run_set_primary(&store, provider, fallbacks, auto_switch)?,
        },
    }

    Ok(())
}
