//! Network Layer: Connectionless Datagram Exchange
//!
//! Menggunakan mio untuk non-blocking UDP dengan batas waktu.
//!
//! Fitur:
//! - `send` fire-and-forget ke satu peer
//! - `recv` satu datagram dengan timeout opsional
//! - Cancellation lintas thread lewat mio `Waker`

mod transport;

pub use transport::{Canceller, Received, Transport, UdpTransport};
