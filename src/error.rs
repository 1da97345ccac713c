//! Error types for ngps-link

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::exchange::Stage;

/// Received bytes do not decode to a valid 11-field report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected an array container, found {0}")]
    NotAnArray(String),

    #[error("container declares {0} elements, expected 11")]
    ElementCount(u32),

    #[error("field `{field}` has incompatible wire type {marker}")]
    TypeMismatch { field: &'static str, marker: String },

    #[error("field `{field}` value does not fit its declared width")]
    OutOfRange { field: &'static str },

    #[error("input ended inside {0}")]
    Truncated(&'static str),

    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),
}

/// Encoder buffer cannot hold the encoded report
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("encoded report does not fit in a {capacity} byte buffer")]
pub struct EncodeError {
    pub capacity: usize,
}

/// Failure of a single request/response exchange
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("transport failure during {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("no reply within {0:?}")]
    NoReply(Duration),

    #[error("exchange cancelled")]
    Cancelled,
}

impl ExchangeError {
    /// Transport failures end the whole run, everything else is per iteration
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExchangeError::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
