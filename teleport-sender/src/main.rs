//! teleport-sender entry point.
//!
//! ```text
//! teleport-sender                   Run with teleport-sender.toml or defaults
//! teleport-sender --config <path>   Load a custom config TOML
//! teleport-sender --mode fanout     Override the delivery model
//! teleport-sender --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use teleport_sender::config::{Mode, SenderConfig};
use teleport_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "teleport-sender", about = "Stream a synthetic test source to teleport receivers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "teleport-sender.toml")]
    config: PathBuf,

    /// Delivery model, overriding the config file.
    #[arg(short, long, value_enum)]
    mode: Option<CliMode>,

    /// Name announced on the LAN, overriding the config file.
    #[arg(short, long)]
    identifier: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliMode {
    Session,
    Fanout,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Session => Mode::Session,
            CliMode::Fanout => Mode::Fanout,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    if let Some(mode) = cli.mode {
        config.output.mode = mode.into();
    }
    if let Some(identifier) = cli.identifier {
        config.output.identifier = identifier;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("teleport-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("mode: {:?}", config.output.mode);
    let (width, height) = config.dimensions();
    info!(
        "source: {width}x{height} {} at {} fps",
        config.source.pixel_format,
        config.fps()
    );

    let service = SenderService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
