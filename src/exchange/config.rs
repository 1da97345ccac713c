//! Exchange configuration

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{PositionReport, MAX_ENCODED_LEN};

/// Default peer port of the position server
pub const DEFAULT_PORT: u16 = 20001;

/// Receive buffer historically used by the peer protocol
pub const DEFAULT_RECV_BUFFER: usize = 1024;

/// Record sent on the first iteration
pub fn sample_report() -> PositionReport {
    PositionReport {
        edge_id: 1,
        offset: 500,
        uncertainty: 2,
        pos_valid: true,
        speed: 2000,
        speed_valid: true,
        gd0: true,
        reversing: false,
        stationary: false,
        accel: 0,
        sensor_count: 1,
    }
}

/// Driver configuration
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Alamat peer tujuan
    pub peer: SocketAddr,
    /// Alamat lokal untuk bind socket
    pub bind: SocketAddr,
    /// Jumlah iterasi round trip
    pub iterations: u64,
    /// Jeda antar iterasi
    pub interval: Duration,
    /// Batas tunggu reply; `None` menunggu sampai di-cancel
    pub reply_timeout: Option<Duration>,
    /// Kapasitas buffer recv (byte)
    pub recv_buffer: usize,
    /// SO_RCVBUF kernel, `None` = default OS
    pub socket_recv_buffer: Option<usize>,
    /// Report pertama yang dikirim
    pub initial: PositionReport,
    /// Pertambahan offset per iterasi (dikali indeks iterasi)
    pub offset_step: u32,
    /// Pertambahan speed per iterasi (dikali indeks iterasi)
    pub speed_step: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            peer: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            iterations: 10,
            interval: Duration::from_millis(1000),
            reply_timeout: Some(Duration::from_millis(1000)),
            recv_buffer: DEFAULT_RECV_BUFFER,
            socket_recv_buffer: None,
            initial: sample_report(),
            offset_step: 100,
            speed_step: 1000,
        }
    }
}

impl ExchangeConfig {
    /// Reject settings the driver cannot honour
    pub fn validate(&self) -> io::Result<()> {
        if self.recv_buffer <= MAX_ENCODED_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "receive buffer of {} bytes must exceed the {} byte maximum report",
                    self.recv_buffer, MAX_ENCODED_LEN
                ),
            ));
        }
        if self.reply_timeout == Some(Duration::ZERO) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reply timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}
