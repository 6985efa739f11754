/*!
 * tcptee CLI - transparent TCP traffic duplicator
 */

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::info;

use tcptee::{
    config::{ConfigFile, RelayConfig},
    error::{RelayError, Result},
    logging, Server, VERSION,
};

#[derive(Parser)]
#[command(name = "tcptee")]
#[command(version = VERSION)]
#[command(about = "Transparent TCP traffic duplicator", long_about = None)]
struct Cli {
    /// Listen address (e.g. 'localhost:7000')
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Forward-to address: the primary endpoint whose replies return to the client
    #[arg(short, long, value_name = "ADDR")]
    forward: Option<String>,

    /// Comma-separated mirror addresses; repeatable, accumulating
    #[arg(short, long, value_name = "ADDRS", value_delimiter = ',')]
    mirror: Vec<String>,

    /// Use the kernel zero-copy transport (splice/tee)
    #[arg(short = 'z', long)]
    zero_copy: bool,

    /// Mirror connect timeout in milliseconds [default: 500]
    #[arg(short = 't', long, value_name = "MS")]
    connect_timeout: Option<u64>,

    /// Delay before retrying a failed mirror in milliseconds (reserved) [default: 20000]
    #[arg(short = 'd', long, value_name = "MS")]
    retry_delay: Option<u64>,

    /// Mirror write timeout in milliseconds for the copy transport [default: 20]
    #[arg(short = 'w', long, value_name = "MS")]
    write_timeout: Option<u64>,

    /// Load settings from a TOML config file; flags take precedence
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(cli)?;

    info!(
        "listening on {} forwarding to {} with {} mirror(s), {} transport",
        config.listen,
        config.forward,
        config.mirrors.len(),
        if config.zero_copy { "zero-copy" } else { "copy" }
    );

    let server = Server::bind(config)?;
    server.run();
    Ok(())
}

/// Assemble the runtime configuration: config file first, flags on top.
fn build_config(cli: Cli) -> Result<RelayConfig> {
    let file = match cli.config {
        Some(ref path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let listen = cli
        .listen
        .or(file.listen)
        .ok_or_else(|| RelayError::Config("listen address is required (-l/--listen)".into()))?;
    let forward = cli
        .forward
        .or(file.forward)
        .ok_or_else(|| RelayError::Config("forward address is required (-f/--forward)".into()))?;

    let mut config = RelayConfig::new(listen, forward);
    config.mirrors = file.mirrors;
    config.mirrors.extend(cli.mirror);
    config.zero_copy = cli.zero_copy || file.zero_copy.unwrap_or(false);
    if let Some(ms) = cli.connect_timeout.or(file.connect_timeout_ms) {
        config.connect_timeout_ms = ms;
    }
    if let Some(ms) = cli.write_timeout.or(file.write_timeout_ms) {
        config.write_timeout_ms = ms;
    }
    if let Some(ms) = cli.retry_delay.or(file.retry_delay_ms) {
        config.retry_delay_ms = ms;
    }

    config.validate()?;
    Ok(config)
}
