//! Error types for Linux SPI operations

use thiserror::Error;

/// Linux SPI specific errors
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    /// Bus session error
    #[error(transparent)]
    Bus(#[from] spibus_core::Error),

    /// Failed to request the chip-select GPIO line
    #[error("Failed to request GPIO line {line} on '{chip}': {source}")]
    LineRequestFailed {
        chip: String,
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for Linux SPI operations
pub type Result<T> = std::result::Result<T, LinuxSpiError>;
