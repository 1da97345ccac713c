//! Exchange Layer: request/response driver
//!
//! Satu iterasi = satu round trip:
//! `Build → Encode → Send → AwaitReply → Decode → Report`
//!
//! Hanya satu exchange outstanding pada satu waktu, tanpa
//! correlation id: reply dicocokkan dengan request murni dari urutan datang.

mod config;
mod driver;
mod workload;

use std::fmt;

pub use config::{sample_report, ExchangeConfig};
pub use driver::{ExchangeDriver, LogSink, ReportSink, RunSummary};
pub use workload::Workload;

/// Tahapan state machine per iterasi
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Encode,
    Send,
    AwaitReply,
    Decode,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Build => "build",
            Stage::Encode => "encode",
            Stage::Send => "send",
            Stage::AwaitReply => "await-reply",
            Stage::Decode => "decode",
            Stage::Report => "report",
        })
    }
}
