/*!
 * tcptee - transparent TCP traffic duplicator
 *
 * Accepts client connections, relays them bidirectionally to a primary
 * forwardee, and delivers a one-way copy of the client-to-forwardee byte
 * stream to any number of mirror endpoints. Mirror replies are read and
 * discarded; a slow or failing mirror is killed rather than allowed to
 * disturb the primary relay.
 *
 * Two per-session transports:
 * - copy: user-space read/write fan-out with a bounded write deadline on
 *   mirror writes
 * - zero-copy: kernel splice/tee through anonymous pipes (Linux only)
 */

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod server;

// Re-export commonly used types for convenience
pub use crate::config::{ConfigFile, RelayConfig};
pub use crate::core::zero_copy::ZeroCopyCapabilities;
pub use crate::core::Mirror;
pub use crate::error::{RelayError, Result};
pub use crate::server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if the zero-copy transport is available on this platform
pub fn is_zero_copy_available() -> bool {
    ZeroCopyCapabilities::detect().available
}
