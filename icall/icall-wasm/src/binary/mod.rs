//! Binary decoding for WASM modules: byte cursor with LEB128 readers and the
//! section parser. Errors carry the byte offset at which decoding failed and
//! are wrapped by [`crate::error::ParseError`] at the public boundary.

pub mod cursor;
pub mod sections;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, BinaryReadError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryReadError {
    #[error("unexpected EOF at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 overflow (target bits={target_bits}) at offset {offset}")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("too many bytes in LEB128 (limit={limit}) at offset {offset}")]
    Leb128TooManyBytes { limit: u8, offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("malformed binary at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
