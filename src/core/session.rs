//! Session supervisor.
//!
//! One session per accepted client connection. The supervisor dials the
//! downstream endpoints, spawns the concurrent flows, waits for the first
//! fatal event, and tears everything down. Mirror-error events are purely
//! informational; no mirror-originating condition ever terminates a session.

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::mirror::Mirror;
use super::{copy, MirrorEvent, SessionEnd};
use crate::config::RelayConfig;

/// Fatal channel capacity: at most the two primary-path flows publish, once
/// each
const FATAL_CAPACITY: usize = 2;

/// Extra mirror-error slots beyond one per mirror
const MIRROR_EVENT_SLACK: usize = 4;

/// How long teardown waits for the zero-copy drains to flush their pipes
/// into healthy mirror sockets before closing the mirrors anyway
const MIRROR_FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Handles the supervisor needs for an orderly teardown of the spawned
/// flows. The copy transport finishes its mirror writes inline, so only the
/// zero-copy transport populates the flush machinery.
struct DataPlane {
    ingress_forward: Option<thread::JoinHandle<()>>,
    drain_done: Option<Receiver<()>>,
    drains: usize,
}

impl DataPlane {
    fn plain() -> Self {
        Self {
            ingress_forward: None,
            drain_done: None,
            drains: 0,
        }
    }
}

/// Run one relay session to completion.
///
/// Dialing the forwardee is fatal on failure: the client connection is
/// dropped and the session never starts. Dialing a mirror is best-effort: a
/// mirror that cannot be reached within the connect timeout is logged and
/// omitted, with no retry inside the session.
pub fn run(conn_no: u64, ingress: TcpStream, config: &RelayConfig) {
    let ingress = Arc::new(ingress);

    let forwardee = match TcpStream::connect(config.forward.as_str()) {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            error!(
                conn = conn_no,
                "failed to connect to forwardee {}: {}, closing client connection",
                config.forward,
                e
            );
            return;
        }
    };

    let mirrors = dial_mirrors(conn_no, config);

    let (fatal_tx, fatal_rx) = bounded::<SessionEnd>(FATAL_CAPACITY);
    let (event_tx, event_rx) = bounded::<MirrorEvent>(mirrors.len() + MIRROR_EVENT_SLACK);

    // Reply drains run in both transports: mirror responses are read and
    // discarded so they cannot fill the mirror's receive window
    for mirror in &mirrors {
        let mirror = Arc::clone(mirror);
        let events = event_tx.clone();
        thread::spawn(move || super::mirror::drain_replies(&mirror, &events));
    }

    let plane = if config.zero_copy {
        spawn_spliced_flows(&ingress, &forwardee, &mirrors, &fatal_tx, &event_tx)
    } else {
        spawn_copy_flows(&ingress, &forwardee, &mirrors, &fatal_tx, &event_tx)
    };

    // Only the flows hold senders from here on, so channel disconnection
    // tracks flow termination
    drop(fatal_tx);
    drop(event_tx);

    supervise(conn_no, &fatal_rx, &event_rx);

    teardown(conn_no, &ingress, &forwardee, &mirrors, plane);

    // Surface any mirror events that raced with teardown
    while let Ok(event) = event_rx.try_recv() {
        log_mirror_event(conn_no, &event);
    }

    info!(conn = conn_no, "session closed");
}

/// Close every owned connection exactly once.
///
/// Shutting down the primary sockets unblocks the ingress-forward flow; in
/// zero-copy mode that flow then drops the fan-out pipe write ends, so each
/// drain can flush what its pipe still holds into the mirror socket and
/// exit. Mirrors are closed only after that flush (or its bounded grace), so
/// a clean session end does not cut off bytes already tee'd to a healthy
/// mirror.
fn teardown(
    conn_no: u64,
    ingress: &TcpStream,
    forwardee: &TcpStream,
    mirrors: &[Arc<Mirror>],
    plane: DataPlane,
) {
    let _ = ingress.shutdown(Shutdown::Both);
    let _ = forwardee.shutdown(Shutdown::Both);

    if let Some(handle) = plane.ingress_forward {
        let _ = handle.join();
    }
    if let Some(done) = plane.drain_done {
        let deadline = Instant::now() + MIRROR_FLUSH_GRACE;
        for _ in 0..plane.drains {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if done.recv_timeout(remaining).is_err() {
                debug!(conn = conn_no, "mirror flush grace expired");
                break;
            }
        }
    }

    for mirror in mirrors {
        if mirror.kill() {
            debug!(
                conn = conn_no,
                mirror = mirror.addr(),
                "closed live mirror at teardown"
            );
        }
    }
}

fn dial_mirrors(conn_no: u64, config: &RelayConfig) -> Vec<Arc<Mirror>> {
    let mut mirrors = Vec::with_capacity(config.mirrors.len());
    for addr in &config.mirrors {
        match dial_mirror(addr, config) {
            Ok(mirror) => {
                debug!(conn = conn_no, mirror = %addr, "connected mirror");
                mirrors.push(Arc::new(mirror));
            }
            Err(e) => {
                warn!(
                    conn = conn_no,
                    mirror = %addr,
                    "failed to connect to mirror: {}, will continue without it",
                    e
                );
            }
        }
    }
    mirrors
}

fn dial_mirror(addr: &str, config: &RelayConfig) -> io::Result<Mirror> {
    let sockaddr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing"))?;
    let conn = TcpStream::connect_timeout(&sockaddr, config.connect_timeout())?;
    // The write deadline is the copy transport's defense against slow
    // mirrors; the zero-copy transport relies on the non-blocking tee
    if !config.zero_copy && !config.write_timeout().is_zero() {
        conn.set_write_timeout(Some(config.write_timeout()))?;
    }
    Ok(Mirror::new(addr, conn))
}

fn spawn_copy_flows(
    ingress: &Arc<TcpStream>,
    forwardee: &Arc<TcpStream>,
    mirrors: &[Arc<Mirror>],
    fatal_tx: &Sender<SessionEnd>,
    event_tx: &Sender<MirrorEvent>,
) -> DataPlane {
    {
        let forwardee = Arc::clone(forwardee);
        let ingress = Arc::clone(ingress);
        let fatal = fatal_tx.clone();
        thread::spawn(move || copy::forward(&forwardee, &ingress, &fatal));
    }
    {
        let ingress = Arc::clone(ingress);
        let forwardee = Arc::clone(forwardee);
        let mirrors = mirrors.to_vec();
        let fatal = fatal_tx.clone();
        let events = event_tx.clone();
        thread::spawn(move || copy::forward_fanout(&ingress, &forwardee, &mirrors, &fatal, &events));
    }
    DataPlane::plain()
}

#[cfg(target_os = "linux")]
fn spawn_spliced_flows(
    ingress: &Arc<TcpStream>,
    forwardee: &Arc<TcpStream>,
    mirrors: &[Arc<Mirror>],
    fatal_tx: &Sender<SessionEnd>,
    event_tx: &Sender<MirrorEvent>,
) -> DataPlane {
    use super::zero_copy::linux::{
        forward_fanout_spliced, forward_spliced, splice_drain, FanoutMirror, SplicePipe,
    };

    {
        let forwardee = Arc::clone(forwardee);
        let ingress = Arc::clone(ingress);
        let fatal = fatal_tx.clone();
        thread::spawn(move || forward_spliced(&forwardee, &ingress, &fatal));
    }

    let fan_in = match SplicePipe::new() {
        Ok(pipe) => pipe,
        Err(e) => {
            let _ = fatal_tx.send(SessionEnd::Failed {
                context: "create fan-in pipe",
                error: e,
            });
            return DataPlane::plain();
        }
    };

    let (done_tx, done_rx) = bounded::<()>(mirrors.len());
    let mut fanout = Vec::with_capacity(mirrors.len());
    let mut drains = 0;
    for mirror in mirrors {
        match SplicePipe::new() {
            Ok(pipe) => {
                let (rd, wr) = pipe.into_split();
                let drain_mirror = Arc::clone(mirror);
                let events = event_tx.clone();
                let done = done_tx.clone();
                thread::spawn(move || splice_drain(rd, drain_mirror, events, done));
                drains += 1;
                fanout.push(FanoutMirror {
                    mirror: Arc::clone(mirror),
                    tee_wr: wr,
                });
            }
            Err(e) => {
                // Treated like a failed mirror dial: this mirror is lost, the
                // session is not
                super::mirror::report_dead(mirror, event_tx, e);
            }
        }
    }

    let ingress_forward = {
        let ingress = Arc::clone(ingress);
        let forwardee = Arc::clone(forwardee);
        let fatal = fatal_tx.clone();
        let events = event_tx.clone();
        thread::spawn(move || {
            forward_fanout_spliced(&ingress, &forwardee, fan_in, fanout, &fatal, &events)
        })
    };

    DataPlane {
        ingress_forward: Some(ingress_forward),
        drain_done: Some(done_rx),
        drains,
    }
}

#[cfg(not(target_os = "linux"))]
fn spawn_spliced_flows(
    _ingress: &Arc<TcpStream>,
    _forwardee: &Arc<TcpStream>,
    _mirrors: &[Arc<Mirror>],
    fatal_tx: &Sender<SessionEnd>,
    _event_tx: &Sender<MirrorEvent>,
) -> DataPlane {
    // Configuration validation rejects zero-copy before any session runs
    let _ = fatal_tx.send(SessionEnd::Failed {
        context: "zero-copy transport",
        error: io::Error::new(io::ErrorKind::Unsupported, "splice/tee unavailable"),
    });
    DataPlane::plain()
}

/// Wait for the first fatal event, logging mirror events as they arrive.
fn supervise(conn_no: u64, fatal_rx: &Receiver<SessionEnd>, event_rx: &Receiver<MirrorEvent>) {
    loop {
        select! {
            recv(fatal_rx) -> msg => {
                if let Ok(end) = msg {
                    log_session_end(conn_no, &end);
                }
                return;
            }
            recv(event_rx) -> msg => {
                match msg {
                    Ok(event) => log_mirror_event(conn_no, &event),
                    Err(_) => {
                        // Every mirror producer is gone; only a fatal event
                        // can arrive now
                        if let Ok(end) = fatal_rx.recv() {
                            log_session_end(conn_no, &end);
                        }
                        return;
                    }
                }
            }
        }
    }
}

fn log_session_end(conn_no: u64, end: &SessionEnd) {
    match end {
        SessionEnd::Eof => {
            info!(conn = conn_no, "end of stream on primary path, closing session");
        }
        SessionEnd::Failed { context, error } => {
            error!(
                conn = conn_no,
                "primary path failure ({}): {}, closing session", context, error
            );
        }
    }
}

fn log_mirror_event(conn_no: u64, event: &MirrorEvent) {
    warn!(
        conn = conn_no,
        mirror = %event.addr,
        "mirror error: {}, session continuing without it",
        event.error
    );
}
