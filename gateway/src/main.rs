//! FxGate command-line client.
//!
//! Runs one rate or conversion query through the full gateway (admission control,
//! shared cache, upstream) and prints the outcome as JSON.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxgate_fx::ConversionRequest;
use fxgate_gateway::{Gateway, GatewayConfig};

/// FxGate CLI
#[derive(Parser, Debug)]
#[command(name = "fxgate")]
#[command(about = "Exchange rates and currency conversion with shared caching")]
struct Args {
    /// Caller identity used for admission control
    #[arg(long, global = true, default_value = "cli")]
    identity: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show exchange rates
    Rate {
        /// Base currency
        #[arg(long)]
        from: String,

        /// Target currency (all currencies when omitted)
        #[arg(long)]
        to: Option<String>,
    },

    /// Convert an amount into one or more currencies
    Convert {
        /// Base currency
        #[arg(long)]
        from: String,

        /// Comma-separated target currencies
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,

        /// Amount to convert
        #[arg(long)]
        value: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let gateway = Gateway::from_config(&config).await?;
    info!(identity = %args.identity, "Gateway ready");

    let output = match args.command {
        Command::Rate { from, to } => {
            let outcome = gateway.rate(&args.identity, &from, to.as_deref()).await?;
            serde_json::to_string_pretty(&outcome)?
        }
        Command::Convert { from, to, value } => {
            let targets: Vec<String> = to.iter().map(|t| t.trim().to_uppercase()).collect();
            let request = ConversionRequest::new(from.to_uppercase(), targets, value);
            let outcome = gateway.convert(&args.identity, request).await?;
            serde_json::to_string_pretty(&outcome)?
        }
    };

    println!("{output}");
    Ok(())
}
