//! Error types untuk pipe
//!
//! - Konfigurasi (`RecordTooLarge`, `InvalidCapacity`, `Config`): langsung
//!   dilaporkan, tidak ada state yang berubah, tidak di-retry.
//! - `WouldBlock`: hasil normal write non-blocking saat ring penuh.
//! - `Interrupted`: sisi writer/reader sudah di-stop.
//! - `InternalRead` / `Corrupted`: invariant ring sudah rusak, instance
//!   tidak aman dipakai lagi.

use thiserror::Error;

/// Alias result untuk seluruh crate
pub type Result<T> = std::result::Result<T, PipeError>;

#[derive(Error, Debug)]
pub enum PipeError {
    #[error("record of {len} bytes exceeds maximum record size {max}")]
    RecordTooLarge { len: usize, max: u32 },

    #[error("pipe is full")]
    WouldBlock,

    #[error("pipe operation interrupted: side has been stopped")]
    Interrupted,

    #[error("internal read error: woke with reader running but no record available")]
    InternalRead,

    #[error("pipe corrupted: {0}")]
    Corrupted(String),

    #[error("output buffer too small: record is {needed} bytes, buffer holds {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("invalid capacity {capacity}: {reason}")]
    InvalidCapacity { capacity: u32, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("shared segment rejected: {0}")]
    Segment(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipeError {
    /// Error yang berarti instance pipe tidak boleh dipakai lagi
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InternalRead | Self::Corrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipeError::InternalRead.is_fatal());
        assert!(PipeError::Corrupted("bad length".into()).is_fatal());
        assert!(!PipeError::WouldBlock.is_fatal());
        assert!(!PipeError::Interrupted.is_fatal());
    }

    #[test]
    fn test_messages() {
        let e = PipeError::RecordTooLarge { len: 40, max: 27 };
        assert_eq!(e.to_string(), "record of 40 bytes exceeds maximum record size 27");

        let io: PipeError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io, PipeError::Io(_)));
    }
}
