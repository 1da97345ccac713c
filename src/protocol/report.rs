//! Position Report - Fixed 11-field telemetry record
//!
//! Layout di wire (MessagePack, positional):
//! ┌─────────────────────────────────────────────────────┐
//! │ fixarray(11)                                        │
//! ├─────────────────────────────────────────────────────┤
//! │ edge_id      u16   │ offset       u32               │
//! │ uncertainty  u32   │ pos_valid    bool              │
//! │ speed        u32   │ speed_valid  bool              │
//! │ gd0          bool  │ reversing    bool              │
//! │ stationary   bool  │ accel        i16               │
//! │ sensor_count u16   │                                │
//! └─────────────────────────────────────────────────────┘
//!
//! Integer di-encode dengan representasi terkecil yang muat,
//! boolean memakai marker bool milik MessagePack sendiri.

use std::fmt;

/// Jumlah elemen dalam container
pub const FIELD_COUNT: u32 = 11;

/// Worst-case encoded size in bytes:
/// fixarray(1) + u16(3) + u32(5) + u32(5) + bool(1) + u32(5) + 4 x bool(4) + i16(3) + u16(3)
pub const MAX_ENCODED_LEN: usize = 30;

/// Field names in wire order; `decode` names the failing element from this table
pub const FIELD_NAMES: [&str; FIELD_COUNT as usize] = [
    "edge_id",
    "offset",
    "uncertainty",
    "pos_valid",
    "speed",
    "speed_valid",
    "gd0",
    "reversing",
    "stationary",
    "accel",
    "sensor_count",
];

/// Localized position/speed report of a train
///
/// Value type: dibuat baru per exchange, tidak ada shared ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionReport {
    /// Track segment identifier, 0 = not localized
    pub edge_id: u16,
    /// Distance from segment start (mm)
    pub offset: u32,
    /// Position uncertainty (mm)
    pub uncertainty: u32,
    /// Position fields are trustworthy
    pub pos_valid: bool,
    /// Speed magnitude (mm/s)
    pub speed: u32,
    /// Speed is trustworthy
    pub speed_valid: bool,
    /// Reference position is on the GD0 end of the segment
    pub gd0: bool,
    /// Direction of offset change relative to gd0
    pub reversing: bool,
    /// Velocity is zero
    pub stationary: bool,
    /// Acceleration (mm/s²)
    pub accel: i16,
    /// Number of sensors contributing to the fix
    pub sensor_count: u16,
}

impl PositionReport {
    /// Apakah train sudah ter-lokalisasi di sebuah edge
    #[inline(always)]
    pub fn is_localized(&self) -> bool {
        self.edge_id != 0
    }
}

impl fmt::Display for PositionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edge_id: {} offset: {} uncertainty: {} pos_valid: {} speed: {} speed_valid: {} \
             gd0: {} reversing: {} stationary: {} accel: {} sensor_count: {}",
            self.edge_id,
            self.offset,
            self.uncertainty,
            u8::from(self.pos_valid),
            self.speed,
            u8::from(self.speed_valid),
            u8::from(self.gd0),
            u8::from(self.reversing),
            u8::from(self.stationary),
            self.accel,
            self.sensor_count,
        )
    }
}
