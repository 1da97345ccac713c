//! ngps-link - Position report exchange over UDP
//!
//! Arsitektur:
//! - Protocol: positional MessagePack, satu array 11 elemen per report
//! - Network: mio-based UDP dengan bounded wait dan cancellation
//! - Exchange: satu request, satu reply, tanpa retry atau sequencing

pub mod error;
pub mod exchange;
pub mod network;
pub mod protocol;

pub use error::{EncodeError, ExchangeError, FormatError};
pub use exchange::{ExchangeConfig, ExchangeDriver, RunSummary};
pub use network::{Canceller, Transport, UdpTransport};
pub use protocol::{decode, Encoder, PositionReport};
