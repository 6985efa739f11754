/*!
 * Zero-copy transport using Linux splice(2) and tee(2)
 *
 * Moves bytes between sockets through anonymous kernel pipes without
 * touching user space. Fan-out to mirrors duplicates pipe contents with
 * tee, which does not consume from the source pipe, so the subsequent
 * splice to the forwardee still carries the same bytes.
 */

/// Capabilities for zero-copy relaying on this platform
#[derive(Debug, Clone)]
pub struct ZeroCopyCapabilities {
    pub available: bool,
    pub method: &'static str,
}

impl ZeroCopyCapabilities {
    /// Detect available zero-copy capabilities at runtime
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self {
                available: true,
                method: "splice+tee",
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            Self {
                available: false,
                method: "none",
            }
        }
    }
}

// ============================================================================
// Linux implementation
// ============================================================================

#[cfg(target_os = "linux")]
pub(crate) mod linux {
    use std::io;
    use std::net::TcpStream;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::ptr;
    use std::sync::Arc;

    use crossbeam_channel::Sender;

    use crate::core::mirror::{report_dead, Mirror};
    use crate::core::{MirrorEvent, SessionEnd};

    /// Largest length passed to splice/tee; the kernel clamps internally
    pub const SPLICE_MAX: usize = isize::MAX as usize;

    /// An anonymous kernel pipe pair used as a splice buffer
    pub struct SplicePipe {
        rd: OwnedFd,
        wr: OwnedFd,
    }

    impl SplicePipe {
        pub fn new() -> io::Result<Self> {
            let mut fds: [libc::c_int; 2] = [0; 2];
            let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            // The fds are fresh and owned by nothing else
            unsafe {
                Ok(Self {
                    rd: OwnedFd::from_raw_fd(fds[0]),
                    wr: OwnedFd::from_raw_fd(fds[1]),
                })
            }
        }

        pub fn read_fd(&self) -> RawFd {
            self.rd.as_raw_fd()
        }

        pub fn write_fd(&self) -> RawFd {
            self.wr.as_raw_fd()
        }

        /// Split into independently owned ends so the write side can live
        /// with the tee-ing flow and the read side with the draining flow.
        /// Dropping the write end gives the reader EOF.
        pub fn into_split(self) -> (PipeReader, PipeWriter) {
            (PipeReader(self.rd), PipeWriter(self.wr))
        }
    }

    /// Owned read end of a pipe
    pub struct PipeReader(OwnedFd);

    impl PipeReader {
        pub fn fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }

    /// Owned write end of a pipe
    pub struct PipeWriter(OwnedFd);

    impl PipeWriter {
        pub fn fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }

    /// Blocking splice with SPLICE_F_MOVE; retries on EINTR
    pub(crate) fn splice(fd_in: RawFd, fd_out: RawFd, len: usize) -> io::Result<usize> {
        loop {
            let ret = unsafe {
                libc::splice(
                    fd_in,
                    ptr::null_mut(),
                    fd_out,
                    ptr::null_mut(),
                    len,
                    libc::SPLICE_F_MOVE,
                )
            };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
    }

    /// Non-blocking tee; retries on EINTR.
    ///
    /// Non-blocking is essential: a blocking tee against a full fan-out pipe
    /// would park the whole ingress-forward flow behind a stalled mirror.
    /// EAGAIN here means the mirror is a full pipe behind, which is a mirror
    /// failure.
    pub(crate) fn tee(fd_in: RawFd, fd_out: RawFd, len: usize) -> io::Result<usize> {
        loop {
            let ret = unsafe { libc::tee(fd_in, fd_out, len, libc::SPLICE_F_NONBLOCK) };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
    }

    /// One-way spliced relay through a dedicated pipe; used for the return
    /// path (forwardee -> client).
    pub(crate) fn forward_spliced(from: &TcpStream, to: &TcpStream, fatal: &Sender<SessionEnd>) {
        let pipe = match SplicePipe::new() {
            Ok(p) => p,
            Err(e) => {
                let _ = fatal.send(SessionEnd::Failed {
                    context: "create return-path pipe",
                    error: e,
                });
                return;
            }
        };
        let from_fd = from.as_raw_fd();
        let to_fd = to.as_raw_fd();

        loop {
            let n = match splice(from_fd, pipe.write_fd(), SPLICE_MAX) {
                Ok(0) => {
                    let _ = fatal.send(SessionEnd::Eof);
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    let _ = fatal.send(SessionEnd::Failed {
                        context: "splice from forwardee",
                        error: e,
                    });
                    return;
                }
            };

            let mut left = n;
            while left > 0 {
                match splice(pipe.read_fd(), to_fd, left) {
                    Ok(0) => break,
                    Ok(w) => left -= w,
                    Err(e) => {
                        let _ = fatal.send(SessionEnd::Failed {
                            context: "splice to client",
                            error: e,
                        });
                        return;
                    }
                }
            }
        }
    }

    /// A mirror paired with the write end of its fan-out pipe
    pub(crate) struct FanoutMirror {
        pub mirror: Arc<Mirror>,
        pub tee_wr: PipeWriter,
    }

    /// Ingress-forward flow, zero-copy variant.
    ///
    /// Each iteration splices ingress bytes into the fan-in pipe, tees the
    /// visible bytes into every live mirror's fan-out pipe, then splices the
    /// tee'd amount on to the forwardee. Coupling the primary splice length
    /// to the last tee keeps mirrors in step with the primary: the primary
    /// never advances past bytes the mirrors have not been shown. When no
    /// mirror is live the splice uses the unmodified maximum.
    pub(crate) fn forward_fanout_spliced(
        ingress: &TcpStream,
        forwardee: &TcpStream,
        fan_in: SplicePipe,
        mirrors: Vec<FanoutMirror>,
        fatal: &Sender<SessionEnd>,
        events: &Sender<MirrorEvent>,
    ) {
        let in_fd = ingress.as_raw_fd();
        let out_fd = forwardee.as_raw_fd();

        loop {
            match splice(in_fd, fan_in.write_fd(), SPLICE_MAX) {
                Ok(0) => {
                    let _ = fatal.send(SessionEnd::Eof);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = fatal.send(SessionEnd::Failed {
                        context: "splice from ingress",
                        error: e,
                    });
                    return;
                }
            }

            let mut n_teed: Option<usize> = None;
            for fm in &mirrors {
                if !fm.mirror.is_live() {
                    continue;
                }
                match tee(fan_in.read_fd(), fm.tee_wr.fd(), SPLICE_MAX) {
                    Ok(n) => n_teed = Some(n),
                    Err(e) => report_dead(&fm.mirror, events, e),
                }
            }

            match n_teed {
                // Consume exactly the tee'd batch so every live mirror saw a
                // prefix of what the forwardee receives
                Some(n) => {
                    let mut left = n;
                    while left > 0 {
                        match splice(fan_in.read_fd(), out_fd, left) {
                            Ok(0) => break,
                            Ok(w) => left -= w,
                            Err(e) => {
                                let _ = fatal.send(SessionEnd::Failed {
                                    context: "splice to forwardee",
                                    error: e,
                                });
                                return;
                            }
                        }
                    }
                }
                // No live mirrors: drain whatever is visible
                None => {
                    if let Err(e) = splice(fan_in.read_fd(), out_fd, SPLICE_MAX) {
                        let _ = fatal.send(SessionEnd::Failed {
                            context: "splice to forwardee",
                            error: e,
                        });
                        return;
                    }
                }
            }
        }
    }

    /// Per-mirror drain: splice the mirror's fan-out pipe into its socket.
    ///
    /// EOF on the pipe means the ingress-forward flow dropped the write end
    /// at session end; a splice failure means the mirror itself died. The
    /// done channel tells the supervisor this pipe is fully flushed (or
    /// abandoned) so teardown can close the mirror without cutting off
    /// in-flight bytes.
    pub(crate) fn splice_drain(
        pipe: PipeReader,
        mirror: Arc<Mirror>,
        events: Sender<MirrorEvent>,
        done: Sender<()>,
    ) {
        let out_fd = mirror.stream().as_raw_fd();
        loop {
            match splice(pipe.fd(), out_fd, SPLICE_MAX) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    report_dead(&mirror, &events, e);
                    break;
                }
            }
        }
        let _ = done.send(());
    }

}
