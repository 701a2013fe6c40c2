//! Error types for spibus-core

use std::fmt;
use thiserror::Error;

/// Individual device configuration sub-steps
///
/// Mode, speed and word size are each configured once per direction, and
/// every step can fail on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigStep {
    /// Set the SPI mode
    WriteMode,
    /// Read back the SPI mode
    ReadMode,
    /// Set the maximum clock speed
    WriteSpeed,
    /// Read back the maximum clock speed
    ReadSpeed,
    /// Set the word size
    WriteBitsPerWord,
    /// Read back the word size
    ReadBitsPerWord,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WriteMode => "set SPI mode",
            Self::ReadMode => "read SPI mode",
            Self::WriteSpeed => "set max speed",
            Self::ReadSpeed => "read max speed",
            Self::WriteBitsPerWord => "set bits per word",
            Self::ReadBitsPerWord => "read bits per word",
        };
        f.write_str(s)
    }
}

/// Which duplex staging buffer could not be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingBuffer {
    /// Transmit staging buffer
    Transmit,
    /// Receive staging buffer
    Receive,
}

impl fmt::Display for StagingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transmit => f.write_str("transmit"),
            Self::Receive => f.write_str("receive"),
        }
    }
}

/// SPI bus errors
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    /// No device path was given
    #[error("No device specified. Use dev=/dev/spidevX.Y")]
    NoDevice,

    /// Failed to open the device node
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        /// Device path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// One of the configuration sub-steps failed
    #[error("Failed to {step}: {source}")]
    Configure {
        /// Step that failed
        step: ConfigStep,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    // Precondition errors
    /// Transfer attempted on a session without an open device
    #[error("SPI device is not open")]
    NotOpen,

    /// Write buffer is empty
    #[error("Write data cannot be empty")]
    EmptyWriteBuffer,

    /// Read buffer is empty
    #[error("Read buffer cannot be empty")]
    EmptyReadBuffer,

    // Resource errors
    /// Duplex staging buffer allocation failed
    #[error("Failed to allocate {len} byte {buffer} staging buffer")]
    StagingAlloc {
        /// Buffer that failed
        buffer: StagingBuffer,
        /// Requested length in bytes
        len: usize,
    },

    // Chip-select errors
    /// Chip-select hook failed to assert; no data was transferred
    #[error("Chip-select assert failed: {0}")]
    ChipSelectAssert(#[source] std::io::Error),

    /// Chip-select hook failed to deassert after the data was transferred
    #[error("Chip-select deassert failed: {0}")]
    ChipSelectDeassert(#[source] std::io::Error),

    // Transfer errors
    /// The primitive transfer failed; later chunks were not attempted
    #[error("SPI transfer failed at chunk {chunk}: {source}")]
    TransferFailed {
        /// Zero-based index of the failed chunk
        chunk: usize,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The chunk loop ended with bytes left over
    #[error("SPI transfer incomplete: {remaining} bytes not transferred")]
    Incomplete {
        /// Bytes left over
        remaining: usize,
    },
}

impl Error {
    /// Stable negative status code for this error
    ///
    /// Success is represented by `0`, so every code here is negative and
    /// unique per failure class.
    pub fn code(&self) -> i32 {
        match self {
            Self::NoDevice => -2,
            Self::OpenFailed { .. } => -3,
            Self::Configure { step, .. } => match step {
                ConfigStep::WriteMode => -4,
                ConfigStep::ReadMode => -5,
                ConfigStep::WriteSpeed => -6,
                ConfigStep::ReadSpeed => -7,
                ConfigStep::WriteBitsPerWord => -8,
                ConfigStep::ReadBitsPerWord => -9,
            },
            Self::EmptyWriteBuffer => -10,
            Self::EmptyReadBuffer => -11,
            Self::NotOpen => -12,
            Self::StagingAlloc { buffer, .. } => match buffer {
                StagingBuffer::Transmit => -13,
                StagingBuffer::Receive => -14,
            },
            Self::ChipSelectAssert(_) => -15,
            Self::TransferFailed { .. } => -16,
            Self::Incomplete { .. } => -17,
            Self::ChipSelectDeassert(_) => -18,
        }
    }
}

/// Result type for SPI bus operations
pub type Result<T> = std::result::Result<T, Error>;
