//! User-space copy transport.
//!
//! Reads fixed-size chunks and writes them out again. The fan-out variant
//! additionally copies each chunk to every live mirror under the configured
//! write deadline; the primary write carries no deadline so the client
//! observes the forwardee's natural backpressure.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::mirror::{report_dead, Mirror};
use super::{MirrorEvent, SessionEnd, COPY_BUF_SIZE};

/// One-way copy loop with no mirror concerns; used for the return path
/// (forwardee -> client).
pub(crate) fn forward(from: &TcpStream, to: &TcpStream, fatal: &Sender<SessionEnd>) {
    let mut from = from;
    let mut to = to;
    let mut buf = [0u8; COPY_BUF_SIZE];
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => {
                let _ = fatal.send(SessionEnd::Eof);
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = fatal.send(SessionEnd::Failed {
                    context: "return-path read",
                    error: e,
                });
                return;
            }
        };
        if let Err(e) = to.write_all(&buf[..n]) {
            let _ = fatal.send(SessionEnd::Failed {
                context: "return-path write",
                error: e,
            });
            return;
        }
    }
}

/// Ingress-forward loop: client -> forwardee, fanning each chunk out to the
/// live mirrors.
///
/// A mirror write failure, including write-deadline expiry, kills that mirror
/// only; the loop keeps running for the primary path and the other mirrors.
pub(crate) fn forward_fanout(
    ingress: &TcpStream,
    forwardee: &TcpStream,
    mirrors: &[Arc<Mirror>],
    fatal: &Sender<SessionEnd>,
    events: &Sender<MirrorEvent>,
) {
    let mut from = ingress;
    let mut to = forwardee;
    let mut buf = [0u8; COPY_BUF_SIZE];
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => {
                let _ = fatal.send(SessionEnd::Eof);
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = fatal.send(SessionEnd::Failed {
                    context: "ingress read",
                    error: e,
                });
                return;
            }
        };

        if let Err(e) = to.write_all(&buf[..n]) {
            let _ = fatal.send(SessionEnd::Failed {
                context: "forwardee write",
                error: e,
            });
            return;
        }

        for mirror in mirrors {
            if !mirror.is_live() {
                continue;
            }
            let mut conn = mirror.stream();
            if let Err(e) = conn.write_all(&buf[..n]) {
                report_dead(mirror, events, e);
            }
        }
    }
}
