//! Protocol Layer: Positional MessagePack Encoding
//!
//! Prinsip desain:
//! - Positional: satu array 11 elemen, urutan field tetap
//! - Self-describing primitives: byte order mengikuti MessagePack, bukan host
//! - Strict: decode menolak apa pun yang bukan "array(11) dengan tipe yang cocok"

mod codec;
mod report;

pub use codec::{decode, Encoder};
pub use report::{PositionReport, FIELD_COUNT, FIELD_NAMES, MAX_ENCODED_LEN};
