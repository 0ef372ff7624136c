//! Host-to-plugin transport.
//!
//! The host talks to plugins through [`PluginTransport`]. Two
//! implementations are provided:
//!
//! - [`ProcessTransport`]: one child process per plugin, JSON-RPC 2.0 over
//!   stdio, see [`protocol`]
//! - [`InProcessTransport`]: endpoints registered in the host process

pub mod protocol;

mod memory;
mod process;
mod transport;

pub use memory::InProcessTransport;
pub use process::{ProcessTransport, DEFAULT_CALL_TIMEOUT};
pub use transport::{PluginTransport, TransportError};
