//! Exchange driver
//!
//! Menjalankan N iterasi round trip di atas `Transport`:
//! encode report, kirim satu datagram, tunggu tepat satu reply
//! ke buffer fixed-size, decode, lalu laporkan ke `ReportSink`.
//!
//! Kebijakan error:
//! - Transport error: fatal, run berhenti dan error dikembalikan
//! - Format / encode / no reply: dilaporkan per iterasi, run lanjut
//! - Cancelled: run berhenti bersih dengan summary
//!
//! Cancel berlaku untuk satu run. Flag di-reset ketika `run` selesai,
//! jadi driver yang sama bisa di-run lagi.

use std::fmt;
use std::io;

use super::{ExchangeConfig, Stage, Workload};
use crate::error::{ExchangeError, Result};
use crate::network::{Canceller, Received, Transport};
use crate::protocol::{decode, Encoder, PositionReport};

/// Penerima hasil setiap iterasi
pub trait ReportSink {
    fn report(&mut self, iteration: u64, outcome: &Result<PositionReport>);
}

impl<F> ReportSink for F
where
    F: FnMut(u64, &Result<PositionReport>),
{
    fn report(&mut self, iteration: u64, outcome: &Result<PositionReport>) {
        self(iteration, outcome)
    }
}

/// Sink yang hanya menulis ke log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&mut self, iteration: u64, outcome: &Result<PositionReport>) {
        match outcome {
            Ok(report) => log::info!("[{}] reply: {}", iteration, report),
            Err(e) => log::warn!("[{}] exchange failed: {}", iteration, e),
        }
    }
}

/// Statistik satu run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub replies: u64,
    pub format_errors: u64,
    pub encode_errors: u64,
    pub no_replies: u64,
    pub suspect_datagrams: u64,
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &Result<PositionReport>) {
        match outcome {
            Ok(_) => self.replies += 1,
            Err(ExchangeError::Format(_)) => self.format_errors += 1,
            Err(ExchangeError::Encode(_)) => self.encode_errors += 1,
            Err(ExchangeError::NoReply(_)) => self.no_replies += 1,
            Err(_) => {}
        }
    }

    pub fn failures(&self) -> u64 {
        self.format_errors + self.encode_errors + self.no_replies
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, {} replies, {} format errors, {} encode errors, {} without reply",
            self.iterations, self.replies, self.format_errors, self.encode_errors, self.no_replies
        )?;
        if self.suspect_datagrams > 0 {
            write!(f, ", {} datagrams filled the buffer", self.suspect_datagrams)?;
        }
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// Request/response driver
///
/// Memiliki transport: socket dilepas saat driver di-drop,
/// di jalur sukses maupun error.
pub struct ExchangeDriver<T: Transport> {
    transport: T,
    config: ExchangeConfig,
    canceller: Canceller,
    encoder: Encoder,
    recv_buffer: Box<[u8]>,
    suspect_datagrams: u64,
}

impl<T: Transport> ExchangeDriver<T> {
    /// Membuat driver; buffer encode dan recv dialokasikan sekali di sini
    pub fn new(transport: T, config: ExchangeConfig) -> io::Result<Self> {
        config.validate()?;

        let canceller = transport.canceller();
        let recv_buffer = vec![0u8; config.recv_buffer].into_boxed_slice();

        Ok(Self {
            transport,
            config,
            canceller,
            encoder: Encoder::new(),
            recv_buffer,
            suspect_datagrams: 0,
        })
    }

    /// Handle untuk menghentikan run dari thread lain
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Satu round trip: Encode → Send → AwaitReply → Decode
    pub fn exchange(&mut self, report: &PositionReport) -> Result<PositionReport> {
        log::trace!("{}: {}", Stage::Encode, report);
        let payload = self.encoder.encode(report)?;

        log::trace!("{}: {} bytes", Stage::Send, payload.len());
        let sent = self
            .transport
            .send(payload)
            .map_err(|source| ExchangeError::Transport {
                stage: Stage::Send,
                source,
            })?;
        if sent != payload.len() {
            return Err(ExchangeError::Transport {
                stage: Stage::Send,
                source: io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short datagram send ({} of {} bytes)", sent, payload.len()),
                ),
            });
        }

        log::trace!("{}: timeout {:?}", Stage::AwaitReply, self.config.reply_timeout);
        let received = self
            .transport
            .recv(&mut self.recv_buffer, self.config.reply_timeout)
            .map_err(|source| ExchangeError::Transport {
                stage: Stage::AwaitReply,
                source,
            })?;

        let len = match received {
            Received::Datagram(len) => len,
            Received::TimedOut => {
                return Err(ExchangeError::NoReply(
                    self.config.reply_timeout.unwrap_or_default(),
                ))
            }
            Received::Cancelled => return Err(ExchangeError::Cancelled),
        };

        // Datagram yang memenuhi buffer bisa jadi terpotong oleh OS
        if len >= self.recv_buffer.len() {
            self.suspect_datagrams += 1;
            log::warn!(
                "reply filled the {} byte receive buffer, it may have been truncated",
                self.recv_buffer.len()
            );
        }

        log::trace!("{}: {} bytes", Stage::Decode, len);
        Ok(decode(&self.recv_buffer[..len])?)
    }

    /// Jalankan semua iterasi dari config
    ///
    /// Returns summary kalau run selesai atau di-cancel, error kalau
    /// transport gagal. Cancel yang sudah di-set sebelum `run` tetap
    /// menghentikan run ini; setelah return flag selalu bersih.
    pub fn run<S: ReportSink>(&mut self, sink: &mut S) -> Result<RunSummary> {
        let result = self.run_iterations(sink);
        self.canceller.reset();
        result
    }

    fn run_iterations<S: ReportSink>(&mut self, sink: &mut S) -> Result<RunSummary> {
        let mut workload = Workload::new(
            self.config.initial,
            self.config.offset_step,
            self.config.speed_step,
        );
        let mut summary = RunSummary::default();
        self.suspect_datagrams = 0;

        for iteration in 0..self.config.iterations {
            if self.canceller.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if iteration > 0 && !self.config.interval.is_zero() {
                self.transport
                    .pause(self.config.interval)
                    .map_err(|source| ExchangeError::Transport {
                        stage: Stage::Build,
                        source,
                    })?;
                if self.canceller.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }
            }

            log::trace!("[{}] {}", iteration, Stage::Build);
            let report = workload.next_report();

            let outcome = match self.exchange(&report) {
                Err(ExchangeError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) if e.is_fatal() => {
                    log::error!("[{}] {}", iteration, e);
                    summary.suspect_datagrams = self.suspect_datagrams;
                    log::info!("run aborted after {}", summary);
                    return Err(e);
                }
                outcome => outcome,
            };

            summary.iterations += 1;
            summary.record(&outcome);

            log::trace!("[{}] {}", iteration, Stage::Report);
            sink.report(iteration, &outcome);
        }

        summary.suspect_datagrams = self.suspect_datagrams;
        log::info!("run finished: {}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::exchange::sample_report;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Balasan yang sudah di-script untuk satu recv
    enum Reply {
        Echo,
        Bytes(Vec<u8>),
        Silence,
        Fail(io::ErrorKind),
    }

    /// In-memory transport: mencatat datagram keluar, membalas sesuai script
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Reply>,
        canceller: Canceller,
        cancel_on_recv: bool,
        pauses: Vec<Duration>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                sent: Vec::new(),
                replies: replies.into(),
                canceller: Canceller::new(),
                cancel_on_recv: false,
                pauses: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
            self.sent.push(payload.to_vec());
            Ok(payload.len())
        }

        fn recv(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<Received> {
            if self.cancel_on_recv {
                self.canceller.cancel()?;
            }
            if self.canceller.is_cancelled() {
                return Ok(Received::Cancelled);
            }
            let bytes = match self.replies.pop_front().unwrap_or(Reply::Echo) {
                Reply::Echo => self.sent.last().cloned().unwrap_or_default(),
                Reply::Bytes(bytes) => bytes,
                Reply::Silence => return Ok(Received::TimedOut),
                Reply::Fail(kind) => return Err(io::Error::new(kind, "scripted failure")),
            };
            // OS memotong datagram yang lebih besar dari buffer
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            Ok(Received::Datagram(n))
        }

        fn pause(&mut self, duration: Duration) -> io::Result<()> {
            self.pauses.push(duration);
            Ok(())
        }

        fn canceller(&self) -> Canceller {
            self.canceller.clone()
        }
    }

    fn config(iterations: u64) -> ExchangeConfig {
        ExchangeConfig {
            iterations,
            interval: Duration::ZERO,
            reply_timeout: Some(Duration::from_millis(10)),
            ..ExchangeConfig::default()
        }
    }

    fn ten_element_array() -> Vec<u8> {
        let mut bytes = Encoder::new().encode(&sample_report()).unwrap().to_vec();
        bytes[0] = 0x9a; // fixarray(10)
        bytes.pop();
        bytes
    }

    #[test]
    fn test_sample_report_round_trip() {
        let mut driver = ExchangeDriver::new(ScriptedTransport::new(vec![]), config(1)).unwrap();
        let reply = driver.exchange(&sample_report()).unwrap();
        assert_eq!(reply, sample_report());
        assert_eq!(driver.transport.sent.len(), 1);
        assert_eq!(driver.transport.sent[0][0], 0x9b);
    }

    #[test]
    fn test_fourth_record_follows_accumulation() {
        let mut driver = ExchangeDriver::new(ScriptedTransport::new(vec![]), config(4)).unwrap();
        let mut replies = Vec::new();
        let summary = driver
            .run(&mut |_: u64, outcome: &Result<PositionReport>| {
                replies.push(*outcome.as_ref().unwrap())
            })
            .unwrap();

        assert_eq!(summary.iterations, 4);
        assert_eq!(summary.replies, 4);

        let fourth = decode(&driver.transport.sent[3]).unwrap();
        assert_eq!(fourth.offset, 800);
        assert_eq!(fourth.speed, 5000);
        assert_eq!(replies[3], fourth);
    }

    #[test]
    fn test_ten_elements_is_reported_and_run_continues() {
        let transport = ScriptedTransport::new(vec![Reply::Bytes(ten_element_array()), Reply::Echo]);
        let mut driver = ExchangeDriver::new(transport, config(2)).unwrap();

        let mut outcomes = Vec::new();
        let summary = driver
            .run(&mut |i: u64, outcome: &Result<PositionReport>| {
                outcomes.push((i, outcome.as_ref().copied().map_err(|e| e.to_string())))
            })
            .unwrap();

        assert_eq!(summary.format_errors, 1);
        assert_eq!(summary.replies, 1);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0].1,
            Err(ExchangeError::from(FormatError::ElementCount(10)).to_string())
        );
        assert_eq!(outcomes[1], (1, Ok(sample_report())));
    }

    #[test]
    fn test_no_reply_is_not_fatal() {
        let transport = ScriptedTransport::new(vec![Reply::Silence, Reply::Silence]);
        let mut driver = ExchangeDriver::new(transport, config(3)).unwrap();

        let summary = driver.run(&mut LogSink).unwrap();
        assert_eq!(summary.no_replies, 2);
        assert_eq!(summary.replies, 1);
        assert_eq!(summary.failures(), 2);
    }

    #[test]
    fn test_transport_failure_aborts_run() {
        let transport = ScriptedTransport::new(vec![
            Reply::Echo,
            Reply::Fail(io::ErrorKind::ConnectionRefused),
        ]);
        let mut driver = ExchangeDriver::new(transport, config(5)).unwrap();

        let mut reported = 0;
        let err = driver
            .run(&mut |_: u64, _: &Result<PositionReport>| reported += 1)
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ExchangeError::Transport {
                stage: Stage::AwaitReply,
                ..
            }
        ));
        assert_eq!(reported, 1);
        assert_eq!(driver.transport.sent.len(), 2);
    }

    #[test]
    fn test_cancel_during_wait_stops_cleanly() {
        let mut transport = ScriptedTransport::new(vec![]);
        transport.cancel_on_recv = true;
        let mut driver = ExchangeDriver::new(transport, config(5)).unwrap();

        let summary = driver.run(&mut LogSink).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.iterations, 0);
    }

    #[test]
    fn test_cancel_between_iterations() {
        let mut driver = ExchangeDriver::new(ScriptedTransport::new(vec![]), config(5)).unwrap();
        let canceller = driver.canceller();

        let summary = driver
            .run(&mut |i: u64, _: &Result<PositionReport>| {
                if i == 1 {
                    canceller.cancel().unwrap();
                }
            })
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.replies, 2);
    }

    #[test]
    fn test_cancel_from_sink_skips_pause() {
        let config = ExchangeConfig {
            interval: Duration::from_secs(10),
            ..config(5)
        };
        let mut driver = ExchangeDriver::new(ScriptedTransport::new(vec![]), config).unwrap();
        let canceller = driver.canceller();

        let summary = driver
            .run(&mut |_: u64, _: &Result<PositionReport>| canceller.cancel().unwrap())
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.iterations, 1);
        assert!(driver.transport.pauses.is_empty());
    }

    #[test]
    fn test_pauses_between_iterations_only() {
        let config = ExchangeConfig {
            interval: Duration::from_millis(250),
            ..config(3)
        };
        let mut driver = ExchangeDriver::new(ScriptedTransport::new(vec![]), config).unwrap();

        let summary = driver.run(&mut LogSink).unwrap();
        assert_eq!(summary.replies, 3);
        assert_eq!(driver.transport.pauses, vec![Duration::from_millis(250); 2]);
    }

    #[test]
    fn test_driver_runs_again_after_cancel() {
        let mut driver = ExchangeDriver::new(ScriptedTransport::new(vec![]), config(3)).unwrap();
        let canceller = driver.canceller();

        canceller.cancel().unwrap();
        let first = driver.run(&mut LogSink).unwrap();
        assert!(first.cancelled);
        assert_eq!(first.iterations, 0);
        assert!(!canceller.is_cancelled());

        let second = driver.run(&mut LogSink).unwrap();
        assert!(!second.cancelled);
        assert_eq!(second.replies, 3);
    }

    #[test]
    fn test_oversized_reply_is_suspect_and_rejected() {
        let mut oversized = Encoder::new().encode(&sample_report()).unwrap().to_vec();
        oversized.resize(4096, 0xc0);
        let transport = ScriptedTransport::new(vec![Reply::Bytes(oversized), Reply::Echo]);
        let mut driver = ExchangeDriver::new(transport, config(2)).unwrap();

        let mut first = None;
        let summary = driver
            .run(&mut |i: u64, outcome: &Result<PositionReport>| {
                if i == 0 {
                    first = Some(matches!(
                        outcome,
                        Err(ExchangeError::Format(FormatError::TrailingBytes(_)))
                    ));
                }
            })
            .unwrap();

        assert_eq!(first, Some(true));
        assert_eq!(summary.suspect_datagrams, 1);
        assert_eq!(summary.format_errors, 1);
        assert_eq!(summary.replies, 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = ExchangeConfig {
            recv_buffer: 4,
            ..config(1)
        };
        assert!(ExchangeDriver::new(ScriptedTransport::new(vec![]), bad).is_err());
    }
}
