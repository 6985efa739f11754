//! Shared helpers for the loopback integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use rand::RngCore;
use tcptee::{RelayConfig, Server};

/// Bind the relay on an ephemeral port and run its accept loop in the
/// background. The `listen` field of the config is overridden.
pub fn start_relay(mut config: RelayConfig) -> SocketAddr {
    config.listen = "127.0.0.1:0".to_string();
    let server = Server::bind(config).expect("bind relay");
    let addr = server.local_addr().expect("relay local addr");
    thread::spawn(move || server.run());
    addr
}

/// Echo server reflecting raw bytes back on every connection.
pub fn spawn_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo");
    let addr = listener.local_addr().expect("echo local addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Sink server: collects everything each connection delivers until EOF and
/// sends it on the returned channel, one buffer per connection.
pub fn spawn_sink() -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind sink");
    let addr = listener.local_addr().expect("sink local addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let tx = tx.clone();
            thread::spawn(move || {
                let mut data = Vec::new();
                let _ = stream.read_to_end(&mut data);
                let _ = tx.send(data);
            });
        }
    });
    (addr, rx)
}

/// Accepts connections and immediately closes them.
pub fn spawn_closing_sink() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind closing sink");
    let addr = listener.local_addr().expect("closing sink local addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });
    addr
}

/// Accepts connections but never reads from them, simulating a stalled
/// mirror. Connections are held open for the lifetime of the test process.
pub fn spawn_stalled_sink() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stalled sink");
    let addr = listener.local_addr().expect("stalled sink local addr");
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            if let Ok(stream) = stream {
                held.push(stream);
            }
        }
    });
    addr
}

/// Accepts one connection, writes `reply`, then closes it.
pub fn spawn_reply_then_close(reply: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind replier");
    let addr = listener.local_addr().expect("replier local addr");
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = stream.write_all(&reply);
        }
    });
    addr
}

pub fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Stream `payload` into `stream` in moderately sized chunks, then shut the
/// write side down so the relay observes a clean end of stream.
pub fn stream_and_finish(stream: &mut TcpStream, payload: &[u8]) {
    for chunk in payload.chunks(64 * 1024) {
        stream.write_all(chunk).expect("stream payload chunk");
    }
    stream
        .shutdown(std::net::Shutdown::Write)
        .expect("shutdown write side");
}
