//! Positional MessagePack Encoder/Decoder
//!
//! Encode langsung ke pre-allocated buffer, decode dari slice
//! hasil `recv` tanpa copy. Byte order ditentukan oleh primitive
//! MessagePack (big-endian), bukan oleh layout memory host.

use std::io;

use rmp::decode::{read_array_len, read_bool, read_int, NumValueReadError, ValueReadError};
use rmp::encode;

use super::report::{PositionReport, FIELD_COUNT, FIELD_NAMES, MAX_ENCODED_LEN};
use crate::error::{EncodeError, FormatError};

/// Pre-allocated encoder buffer
///
/// Buffer dipakai ulang untuk setiap report, tidak ada alokasi
/// setelah inisialisasi.
pub struct Encoder {
    buffer: Box<[u8]>,
    len: usize,
}

impl Encoder {
    /// Encoder dengan kapasitas worst-case satu report
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENCODED_LEN)
    }

    /// Membuat encoder dengan buffer size tertentu
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Encode report ke buffer internal
    ///
    /// Returns slice ke encoded bytes. Buffer selalu di-reset dulu,
    /// jadi hasil encode sebelumnya tidak valid lagi.
    #[inline]
    pub fn encode(&mut self, report: &PositionReport) -> Result<&[u8], EncodeError> {
        let capacity = self.buffer.len();
        self.len = 0;

        let remaining = {
            let mut wr: &mut [u8] = &mut self.buffer[..];
            write_report(&mut wr, report).map_err(|_| EncodeError { capacity })?;
            wr.len()
        };

        self.len = capacity - remaining;
        Ok(&self.buffer[..self.len])
    }

    /// Hasil encode terakhir
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker for "the writer ran out of room"; the only way writing can fail
struct Overflow;

fn write_report(wr: &mut &mut [u8], r: &PositionReport) -> Result<(), Overflow> {
    encode::write_array_len(wr, FIELD_COUNT).map_err(|_| Overflow)?;
    write_uint(wr, u64::from(r.edge_id))?;
    write_uint(wr, u64::from(r.offset))?;
    write_uint(wr, u64::from(r.uncertainty))?;
    write_bool(wr, r.pos_valid)?;
    write_uint(wr, u64::from(r.speed))?;
    write_bool(wr, r.speed_valid)?;
    write_bool(wr, r.gd0)?;
    write_bool(wr, r.reversing)?;
    write_bool(wr, r.stationary)?;
    encode::write_sint(wr, i64::from(r.accel)).map_err(|_| Overflow)?;
    write_uint(wr, u64::from(r.sensor_count))?;
    Ok(())
}

#[inline(always)]
fn write_uint(wr: &mut &mut [u8], val: u64) -> Result<(), Overflow> {
    encode::write_uint(wr, val).map(|_| ()).map_err(|_| Overflow)
}

#[inline(always)]
fn write_bool(wr: &mut &mut [u8], val: bool) -> Result<(), Overflow> {
    encode::write_bool(wr, val).map_err(|_| Overflow)
}

/// Decode satu report dari datagram
///
/// Atomic: report hanya dibentuk setelah ke-11 field berhasil dibaca
/// dan tidak ada byte tersisa.
pub fn decode(bytes: &[u8]) -> Result<PositionReport, FormatError> {
    let mut rd = FieldReader { rd: bytes, index: 0 };

    let declared = read_array_len(&mut rd.rd).map_err(|e| match e {
        ValueReadError::TypeMismatch(marker) => FormatError::NotAnArray(format!("{:?}", marker)),
        _ => FormatError::Truncated("container header"),
    })?;
    if declared != FIELD_COUNT {
        return Err(FormatError::ElementCount(declared));
    }

    let edge_id = rd.read_u16()?;
    let offset = rd.read_u32()?;
    let uncertainty = rd.read_u32()?;
    let pos_valid = rd.read_bool()?;
    let speed = rd.read_u32()?;
    let speed_valid = rd.read_bool()?;
    let gd0 = rd.read_bool()?;
    let reversing = rd.read_bool()?;
    let stationary = rd.read_bool()?;
    let accel = rd.read_i16()?;
    let sensor_count = rd.read_u16()?;

    if !rd.rd.is_empty() {
        return Err(FormatError::TrailingBytes(rd.rd.len()));
    }

    Ok(PositionReport {
        edge_id,
        offset,
        uncertainty,
        pos_valid,
        speed,
        speed_valid,
        gd0,
        reversing,
        stationary,
        accel,
        sensor_count,
    })
}

/// Cursor over the remaining input
///
/// `index` menunjuk elemen berikutnya, namanya diambil dari `FIELD_NAMES`
/// supaya error selalu menyebut field sesuai urutan wire.
struct FieldReader<'a> {
    rd: &'a [u8],
    index: usize,
}

impl<'a> FieldReader<'a> {
    fn next_field(&mut self) -> &'static str {
        let field = FIELD_NAMES[self.index];
        self.index += 1;
        field
    }

    fn read_u16(&mut self) -> Result<u16, FormatError> {
        let field = self.next_field();
        read_int::<u16, _>(&mut self.rd).map_err(|e| num_error(field, e))
    }

    fn read_u32(&mut self) -> Result<u32, FormatError> {
        let field = self.next_field();
        read_int::<u32, _>(&mut self.rd).map_err(|e| num_error(field, e))
    }

    fn read_i16(&mut self) -> Result<i16, FormatError> {
        let field = self.next_field();
        read_int::<i16, _>(&mut self.rd).map_err(|e| num_error(field, e))
    }

    fn read_bool(&mut self) -> Result<bool, FormatError> {
        let field = self.next_field();
        read_bool(&mut self.rd).map_err(|e| match e {
            ValueReadError::TypeMismatch(marker) => FormatError::TypeMismatch {
                field,
                marker: format!("{:?}", marker),
            },
            _ => FormatError::Truncated(field),
        })
    }
}

fn num_error(field: &'static str, e: NumValueReadError<io::Error>) -> FormatError {
    match e {
        NumValueReadError::TypeMismatch(marker) => FormatError::TypeMismatch {
            field,
            marker: format!("{:?}", marker),
        },
        NumValueReadError::OutOfRange => FormatError::OutOfRange { field },
        _ => FormatError::Truncated(field),
    }
}
