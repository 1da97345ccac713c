//! ngps-link peer - reply side untuk testing manual
//!
//! Terima datagram, decode sebagai position report, lalu kirim
//! balik report yang sama (di-encode ulang). Datagram yang gagal
//! di-decode di-log dan tidak dibalas.
//!
//! Usage:
//!   cargo run --release --bin ngps_peer -- --bind 0.0.0.0:20001

use std::io;
use std::net::{SocketAddr, UdpSocket};

use clap::Parser;

use ngps_link::protocol::MAX_ENCODED_LEN;
use ngps_link::{decode, Encoder};

/// Echo peer for position report exchanges
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:20001")]
    bind: SocketAddr,

    /// Stop after this many datagrams (0 = run forever)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: u64,
}

fn serve(args: &Args) -> io::Result<()> {
    let socket = UdpSocket::bind(args.bind)?;
    log::info!("ngps peer listening on {}", socket.local_addr()?);

    // Lebih besar dari report terbesar supaya datagram oversized terdeteksi
    let mut buffer = vec![0u8; MAX_ENCODED_LEN * 4];
    let mut encoder = Encoder::new();
    let mut handled = 0u64;

    while args.count == 0 || handled < args.count {
        let (n, from) = socket.recv_from(&mut buffer)?;
        handled += 1;

        match decode(&buffer[..n]) {
            Ok(report) => {
                log::info!("{} -> {}", from, report);
                match encoder.encode(&report) {
                    Ok(reply) => {
                        socket.send_to(reply, from)?;
                    }
                    Err(e) => log::warn!("cannot encode reply for {}: {}", from, e),
                }
            }
            Err(e) => log::warn!("dropping {} byte datagram from {}: {}", n, from, e),
        }
    }

    log::info!("handled {} datagrams, exiting", handled);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = serve(&args) {
        log::error!("peer error: {}", e);
        std::process::exit(1);
    }
}
