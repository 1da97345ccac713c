//! Deterministic report generator feeding the driver

use crate::protocol::PositionReport;

/// Menghasilkan report keluar untuk setiap iterasi
///
/// Report ke-n adalah report awal ditambah akumulasi
/// `offset += i * offset_step` dan `speed += i * speed_step`
/// untuk i = 0..n-1. Saturating supaya run panjang tidak panic.
#[derive(Debug, Clone)]
pub struct Workload {
    current: PositionReport,
    offset_step: u32,
    speed_step: u32,
    iteration: u32,
}

impl Workload {
    pub fn new(initial: PositionReport, offset_step: u32, speed_step: u32) -> Self {
        Self {
            current: initial,
            offset_step,
            speed_step,
            iteration: 0,
        }
    }

    /// Report untuk iterasi ini, lalu akumulasi untuk iterasi berikutnya
    pub fn next_report(&mut self) -> PositionReport {
        let report = self.current;

        let i = self.iteration;
        self.current.offset = self
            .current
            .offset
            .saturating_add(i.saturating_mul(self.offset_step));
        self.current.speed = self
            .current
            .speed
            .saturating_add(i.saturating_mul(self.speed_step));
        self.iteration = self.iteration.saturating_add(1);

        report
    }
}

impl Iterator for Workload {
    type Item = PositionReport;

    fn next(&mut self) -> Option<PositionReport> {
        Some(self.next_report())
    }
}
