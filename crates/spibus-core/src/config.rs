//! Bus configuration types

use bitflags::bitflags;
use std::fmt;

/// Default SPI clock speed in Hz (2 MHz)
pub const DEFAULT_SPEED_HZ: u32 = 2_000_000;

/// Default word size in bits
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

bitflags! {
    /// SPI clock flags
    ///
    /// The four SPI modes are the combinations of these two bits, using the
    /// same values as the Linux spidev interface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u8 {
        /// Clock phase: sample on the trailing edge
        const CPHA = 0x01;
        /// Clock polarity: clock idles high
        const CPOL = 0x02;
    }
}

/// SPI mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl Mode {
    /// Clock flags for this mode
    pub fn flags(self) -> ModeFlags {
        match self {
            Self::Mode0 => ModeFlags::empty(),
            Self::Mode1 => ModeFlags::CPHA,
            Self::Mode2 => ModeFlags::CPOL,
            Self::Mode3 => ModeFlags::CPOL | ModeFlags::CPHA,
        }
    }

    /// Mode for the given clock flags
    pub fn from_flags(flags: ModeFlags) -> Self {
        match (
            flags.contains(ModeFlags::CPOL),
            flags.contains(ModeFlags::CPHA),
        ) {
            (false, false) => Self::Mode0,
            (false, true) => Self::Mode1,
            (true, false) => Self::Mode2,
            (true, true) => Self::Mode3,
        }
    }

    /// Raw mode byte as passed to the kernel
    pub fn bits(self) -> u8 {
        self.flags().bits()
    }

    /// Parse a mode number (0-3)
    pub fn from_number(n: u8) -> Option<Self> {
        ModeFlags::from_bits(n).map(Self::from_flags)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Configuration for opening an SPI bus device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Device path (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI mode (default: mode 0)
    pub mode: Mode,
    /// SPI clock speed in Hz (default: 2 MHz)
    pub speed_hz: u32,
    /// Word size in bits (default: 8)
    pub bits_per_word: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            mode: Mode::Mode0,
            speed_hz: DEFAULT_SPEED_HZ,
            bits_per_word: DEFAULT_BITS_PER_WORD,
        }
    }
}

impl BusConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the SPI mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the SPI clock speed in Hz
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Set the word size in bits
    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = bits;
        self
    }
}
