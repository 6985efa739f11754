use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;

use tcptee::{is_zero_copy_available, RelayConfig, Server};

/// Sink that discards everything every connection sends
fn spawn_sink() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 64 * 1024];
                while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
            });
        }
    });
    addr
}

fn start_relay(zero_copy: bool, forward: SocketAddr) -> SocketAddr {
    let mut config = RelayConfig::new("127.0.0.1:0", forward.to_string());
    config.zero_copy = zero_copy;
    let server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.run());
    addr
}

/// One full session: stream the payload through the relay, then wait for the
/// relay to finish and close
fn run_session(relay: SocketAddr, payload: &[u8]) {
    let mut client = TcpStream::connect(relay).unwrap();
    for chunk in payload.chunks(64 * 1024) {
        client.write_all(chunk).unwrap();
    }
    client.shutdown(Shutdown::Write).unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
}

fn bench_relay_transports(c: &mut Criterion) {
    let payload = vec![0xABu8; 4 * 1024 * 1024];

    let mut group = c.benchmark_group("relay_transports");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.sample_size(20);

    let sink = spawn_sink();
    let copy_relay = start_relay(false, sink);
    group.bench_with_input(BenchmarkId::new("copy", "4MiB"), &payload, |b, payload| {
        b.iter(|| run_session(copy_relay, payload));
    });

    if is_zero_copy_available() {
        let zc_relay = start_relay(true, sink);
        group.bench_with_input(
            BenchmarkId::new("zero-copy", "4MiB"),
            &payload,
            |b, payload| {
                b.iter(|| run_session(zc_relay, payload));
            },
        );
    } else {
        println!("zero-copy not available on this platform, skipping that arm");
    }

    group.finish();
}

criterion_group!(benches, bench_relay_transports);
criterion_main!(benches);
