//! `rrpi-server` binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rrpi_protocol::SizeMode;
use rrpi_server::{metrics::describe_metrics, Backend, Listener, ServerConfig, ServerError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Serve SPI and nRF24 radio commands to remote clients.
#[derive(Parser, Debug)]
#[command(name = "rrpi-server", version, about)]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<std::net::IpAddr>,

    /// TCP port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Hardware backend.
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// SPI transfer size decoding: `little-endian` or `legacy`.
    #[arg(long)]
    size_mode: Option<SizeMode>,

    /// More log output (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(size_mode) = self.size_mode {
            config.size_mode = size_mode;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<(), ServerError> {
    let config = cli.server_config()?;
    describe_metrics();
    info!(
        backend = ?config.backend,
        size_mode = %config.size_mode,
        "starting rrpi-server"
    );

    let listener = Listener::bind(&config)?;
    let shutdown = listener.shutdown_handle()?;
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        shutdown.shutdown();
    })?;

    listener.serve()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}
