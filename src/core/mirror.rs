//! Mirror connection state: the socket plus a monotonic liveness flag.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;

use super::{MirrorEvent, COPY_BUF_SIZE};

/// A secondary downstream endpoint receiving a one-way copy of the ingress
/// stream.
///
/// The connection is shared between the ingress-forward flow (writer) and the
/// reply drain (reader); the liveness flag mediates between them. Liveness is
/// write-once: once dead, a mirror is never revived, and no further write,
/// splice, or tee is attempted on it.
pub struct Mirror {
    addr: String,
    conn: TcpStream,
    dead: AtomicBool,
}

impl Mirror {
    pub fn new(addr: impl Into<String>, conn: TcpStream) -> Self {
        Self {
            addr: addr.into(),
            conn,
            dead: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn stream(&self) -> &TcpStream {
        &self.conn
    }

    pub fn is_live(&self) -> bool {
        !self.dead.load(Ordering::SeqCst)
    }

    /// Transition this mirror to dead.
    ///
    /// Returns true for the observer that performed the transition; that
    /// observer shuts the connection down, exactly once, which unblocks any
    /// flow parked on the socket. Later callers see false and must not touch
    /// the connection.
    pub fn kill(&self) -> bool {
        if self.dead.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.conn.shutdown(Shutdown::Both);
        true
    }
}

/// Read and discard everything the mirror sends back.
///
/// Keeps the mirror's reply stream from filling its send window and
/// back-propagating TCP pressure onto the write path. Any read failure or
/// end-of-stream kills the mirror and ends this flow; the session continues.
pub(crate) fn drain_replies(mirror: &Mirror, events: &Sender<MirrorEvent>) {
    let mut buf = [0u8; COPY_BUF_SIZE];
    let mut conn = mirror.stream();
    loop {
        match conn.read(&mut buf) {
            Ok(0) => {
                let err = io::Error::new(io::ErrorKind::UnexpectedEof, "mirror closed connection");
                report_dead(mirror, events, err);
                return;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                report_dead(mirror, events, e);
                return;
            }
        }
    }
}

/// Kill the mirror and publish the event if this flow won the transition.
/// Publication is non-blocking: the event is dropped when the channel is full.
pub(crate) fn report_dead(mirror: &Mirror, events: &Sender<MirrorEvent>, error: io::Error) {
    if mirror.kill() {
        let _ = events.try_send(MirrorEvent {
            addr: mirror.addr().to_string(),
            error,
        });
    }
}
