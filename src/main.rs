//! ngps-link client
//!
//! Kirim position report ke peer lewat UDP, tunggu satu reply per
//! iterasi, lalu cetak report hasil decode ke stdout.
//!
//! Usage:
//!   cargo run --release --bin ngps_link -- --peer 127.0.0.1:20001 --iterations 10
//!
//! Log level via RUST_LOG (default: info).

use std::error::Error;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use ngps_link::error::Result as ExchangeResult;
use ngps_link::exchange::{sample_report, ReportSink};
use ngps_link::{ExchangeConfig, ExchangeDriver, PositionReport, RunSummary, UdpTransport};

/// Position report exchange client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Peer address to send reports to
    #[arg(short, long, default_value = "127.0.0.1:20001")]
    peer: SocketAddr,

    /// Local address to bind the UDP socket to
    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Number of request/response iterations
    #[arg(short = 'n', long, default_value_t = 10)]
    iterations: u64,

    /// Delay between iterations in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// How long to wait for each reply in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: u64,

    /// Receive buffer size in bytes
    #[arg(long, default_value_t = 1024)]
    recv_buffer: usize,

    /// Kernel socket receive buffer (SO_RCVBUF) in bytes
    #[arg(long)]
    socket_recv_buffer: Option<usize>,

    /// Offset increment per iteration (mm, multiplied by the iteration index)
    #[arg(long, default_value_t = 100)]
    offset_step: u32,

    /// Speed increment per iteration (mm/s, multiplied by the iteration index)
    #[arg(long, default_value_t = 1000)]
    speed_step: u32,
}

impl Args {
    fn into_config(self) -> ExchangeConfig {
        ExchangeConfig {
            peer: self.peer,
            bind: self.bind,
            iterations: self.iterations,
            interval: Duration::from_millis(self.interval_ms),
            reply_timeout: Some(Duration::from_millis(self.timeout_ms)),
            recv_buffer: self.recv_buffer,
            socket_recv_buffer: self.socket_recv_buffer,
            initial: sample_report(),
            offset_step: self.offset_step,
            speed_step: self.speed_step,
        }
    }
}

/// Cetak setiap reply ke stdout, failure ke log
struct StdoutSink<W: Write> {
    out: W,
}

impl<W: Write> ReportSink for StdoutSink<W> {
    fn report(&mut self, iteration: u64, outcome: &ExchangeResult<PositionReport>) {
        match outcome {
            Ok(report) => {
                if let Err(e) = writeln!(self.out, "{}", report) {
                    log::warn!("[{}] could not write report: {}", iteration, e);
                }
            }
            Err(e) => log::warn!("[{}] exchange failed: {}", iteration, e),
        }
    }
}

fn run(config: ExchangeConfig) -> Result<RunSummary, Box<dyn Error>> {
    let transport = UdpTransport::bind(config.bind, config.peer)?;
    if let Some(bytes) = config.socket_recv_buffer {
        transport.set_socket_recv_buffer(bytes)?;
    }
    log::info!(
        "exchanging {} reports with {} from {}",
        config.iterations,
        config.peer,
        transport.local_addr()?
    );

    let mut driver = ExchangeDriver::new(transport, config)?;
    let mut sink = StdoutSink {
        out: io::stdout().lock(),
    };
    Ok(driver.run(&mut sink)?)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    match run(config) {
        Ok(summary) => {
            if summary.failures() > 0 {
                log::warn!("{} of {} exchanges failed", summary.failures(), summary.iterations);
            }
        }
        Err(e) => {
            log::error!("run failed: {}", e);
            std::process::exit(1);
        }
    }
}
