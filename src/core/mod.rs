/*!
 * Per-session data-plane engine
 *
 * One accepted client connection becomes one session: a bidirectional relay
 * to the forwardee plus a one-way copy of the ingress stream to each mirror.
 * Two transports move the bytes: a user-space copy loop and a Linux
 * splice/tee zero-copy path. Mirror failures never terminate a session;
 * primary-path failures always do.
 */

pub mod copy;
pub mod mirror;
pub mod session;
pub mod zero_copy;

pub use mirror::Mirror;

use std::io;

/// Buffer size for the copy transport and the mirror reply drains
pub const COPY_BUF_SIZE: usize = 1024;

/// Terminal event of a primary-path flow, delivered on the fatal channel.
///
/// Only the two flows that touch the primary path (ingress-forward and the
/// return-path forwarder) produce these; mirror flows never do.
#[derive(Debug)]
pub enum SessionEnd {
    /// Clean end of stream on the primary path
    Eof,
    /// Primary-path failure
    Failed {
        context: &'static str,
        error: io::Error,
    },
}

/// Advisory mirror failure event, delivered best-effort on the mirror-error
/// channel. Producers drop the event when the channel is full.
#[derive(Debug)]
pub struct MirrorEvent {
    pub addr: String,
    pub error: io::Error,
}
