/*!
 * Companion echo server: reflects newline-terminated frames.
 *
 * Exists to benchmark the duplicator's data plane; logs active connections
 * and requests per second once a second.
 */

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

static CONNECTIONS: AtomicU64 = AtomicU64::new(0);
static REQUESTS: AtomicU64 = AtomicU64::new(0);

#[derive(Parser)]
#[command(name = "tcptee-echo")]
#[command(about = "Newline echo server for benchmarking tcptee", long_about = None)]
struct Cli {
    /// Listening address
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:11000")]
    listen: String,
}

fn stats_printer() {
    let mut requests_saved = 0;
    loop {
        thread::sleep(Duration::from_secs(1));
        let connections = CONNECTIONS.load(Ordering::Relaxed);
        let requests = REQUESTS.load(Ordering::Relaxed);
        info!("{} c, {} rps", connections, requests - requests_saved);
        requests_saved = requests;
    }
}

fn handle_connection(stream: TcpStream) {
    CONNECTIONS.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = echo_frames(stream) {
        error!("connection error: {:#}", e);
    }
    CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
}

fn echo_frames(mut stream: TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone().context("clone stream for reading")?);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).context("read frame")?;
        if n == 0 {
            return Ok(());
        }
        REQUESTS.fetch_add(1, Ordering::Relaxed);
        stream.write_all(&line).context("write frame")?;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_target(false).init();

    let listener = TcpListener::bind(&cli.listen)
        .with_context(|| format!("bind echo server on {}", cli.listen))?;
    info!("echo server listening on {}", cli.listen);

    thread::spawn(stats_printer);

    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                thread::spawn(move || handle_connection(stream));
            }
            Err(e) => error!("error while accepting: {}", e),
        }
    }
}
