//! chaffd: chaff node daemon
//!
//! Usage:
//!   chaffd [--config chaff.toml] [serve]
//!   chaffd keygen --out keys/
//!   chaffd publish report.pdf [--recipient keys/pub.pem] [--write-jitter-ms 100 700]
//!   chaffd fetch 10.0.0.2:5000 report.pdf --private-key keys/priv.pem [--out .]

mod commands;
mod daemon;
#[cfg(test)]
mod testutil;

use anyhow::Result;
use chaff_core::config::ChaffConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chaffd", version, about = "chaff node daemon")]
struct Cli {
    /// Path to chaff.toml configuration file
    #[arg(long, short = 'c', env = "CHAFF_CONFIG", default_value = "chaff.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides node.log_level
    #[arg(long, env = "CHAFF_LOG")]
    log: Option<String>,

    /// Log format; overrides node.log_format
    #[arg(long, env = "CHAFF_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the control and data channels until interrupted (default)
    Serve,

    /// Generate an RSA keypair as PEM files
    Keygen {
        /// Output directory for priv.pem and pub.pem
        #[arg(long, short = 'o', default_value = "keys")]
        out: PathBuf,
    },

    /// Encode a file into the configured store and shelve its manifest
    Publish {
        file: PathBuf,
        /// Recipient public key PEM (default: shelf.public_key)
        #[arg(long, short = 'r')]
        recipient: Option<PathBuf>,
        /// Skip decoy generation
        #[arg(long)]
        no_decoys: bool,
        /// Embed ciphertext in the manifest so it can be decoded without a store
        #[arg(long)]
        embed: bool,
        /// Pause a random MIN..=MAX milliseconds between store writes
        #[arg(long, num_args = 2, value_names = ["MIN_MS", "MAX_MS"])]
        write_jitter_ms: Option<Vec<u64>>,
    },

    /// Fetch a manifest from a peer's control channel and reconstruct the file
    Fetch {
        /// Control channel endpoint of the peer (host:port)
        peer: String,
        filename: String,
        /// Private key PEM matching the manifest's recipient
        #[arg(long, short = 'k')]
        private_key: PathBuf,
        /// Directory the RECEIVED_ file is written to
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ChaffConfig::load(&cli.config)?;

    let level = cli.log.as_deref().unwrap_or(&config.node.log_level);
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_str(&config.node.log_format, true)
            .map_err(|e| anyhow::anyhow!("node.log_format: {e}"))?,
    };
    init_logging(level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "chaffd starting"
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => daemon::run(config).await,
        Commands::Keygen { out } => commands::keygen(&out).await.map(|_| ()),
        Commands::Publish {
            file,
            recipient,
            no_decoys,
            embed,
            write_jitter_ms,
        } => {
            let write_jitter = match write_jitter_ms.as_deref() {
                Some(&[min, max]) if min <= max => {
                    Some((Duration::from_millis(min), Duration::from_millis(max)))
                }
                Some(_) => anyhow::bail!("--write-jitter-ms wants MIN_MS <= MAX_MS"),
                None => None,
            };
            let opts = chaff_engine::EncodeOptions {
                decoys: !no_decoys,
                embed_ciphertext: embed,
                write_jitter,
                ..Default::default()
            };
            commands::publish(&config, &file, recipient.as_deref(), &opts)
                .await
                .map(|_| ())
        }
        Commands::Fetch {
            peer,
            filename,
            private_key,
            out,
        } => commands::fetch(&config, &peer, &filename, &private_key, &out)
            .await
            .map(|_| ()),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
