/*!
 * Companion load client: opens parallel connections that send
 * newline-terminated messages and read the echoes back, reporting
 * requests per second once a second.
 */

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

static REQUESTS: AtomicU64 = AtomicU64::new(0);

#[derive(Parser)]
#[command(name = "tcptee-load")]
#[command(about = "Parallel load client for benchmarking tcptee", long_about = None)]
struct Cli {
    /// Server address to connect to
    #[arg(short = 'a', long, value_name = "ADDR", default_value = "127.0.0.1:11000")]
    address: String,

    /// How many parallel connections
    #[arg(short, long, value_name = "N", default_value_t = 10)]
    parallel: u32,

    /// Message size in bytes (including the trailing newline)
    #[arg(short = 's', long, value_name = "BYTES", default_value_t = 1024)]
    message_size: usize,
}

fn client(address: String, message: Vec<u8>) -> Result<()> {
    let mut stream =
        TcpStream::connect(&address).with_context(|| format!("connect to {}", address))?;
    let mut reader = BufReader::new(stream.try_clone().context("clone stream for reading")?);
    let mut reply = Vec::new();
    loop {
        stream.write_all(&message).context("send message")?;
        reply.clear();
        let n = reader.read_until(b'\n', &mut reply).context("read echo")?;
        if n == 0 {
            anyhow::bail!("server closed the connection");
        }
        REQUESTS.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_target(false).init();

    let mut message = vec![b'a'; cli.message_size.max(1) - 1];
    message.push(b'\n');

    info!(
        "sending {}-byte messages to {} over {} connections",
        message.len(),
        cli.address,
        cli.parallel
    );

    for _ in 0..cli.parallel {
        let address = cli.address.clone();
        let message = message.clone();
        thread::spawn(move || {
            if let Err(e) = client(address, message) {
                error!("client exited: {:#}", e);
            }
        });
    }

    let mut requests_saved = 0;
    loop {
        thread::sleep(Duration::from_secs(1));
        let requests = REQUESTS.load(Ordering::Relaxed);
        info!("{} req/sec", requests - requests_saved);
        requests_saved = requests;
    }
}
