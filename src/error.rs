//! Error types.
//!
//! Mirrors the two-tier shape `fit-rs` uses (`errors::ParseError` +
//! `errors::FitError`): small, local causes for things that go wrong
//! decoding a single record, and a top-level error for things that make
//! the whole log unusable.

use thiserror::Error;

/// Per-record decode problems. These never abort a read; the reader logs
/// them via `tracing` and moves on (spec.md §7: "per-record errors are
/// local").
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unknown type id {0:#04x}")]
    UnknownType(u8),
    #[error("short record for type {type_id:#04x}: need {expected} bytes, have {actual}")]
    ShortRecord {
        type_id: u8,
        expected: usize,
        actual: usize,
    },
    #[error("struct unpack failed for type {type_id:#04x} field {field}")]
    FieldUnpack { type_id: u8, field: String },
    #[error("missing expected field {0} for clock calibration")]
    MissingClockField(&'static str),
}

/// Fatal errors: the log cannot be opened or its schema is unusable.
#[derive(Debug, Error)]
pub enum DfError {
    #[error("empty input")]
    EmptyInput,
    #[error("no recognizable FMT or magic framing found")]
    NoSchema,
    #[error("unsupported format character {0:?} in FMT definition for type {1:#04x}")]
    UnsupportedFormatChar(char, u8),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format {0:?} not found in registry")]
    UnknownFormatName(String),
    #[error("type id {0:#04x} not found in registry")]
    UnknownFormatId(u8),
}

pub type DfResult<T> = Result<T, DfError>;
