//! spibus-linux - Linux spidev support
//!
//! This crate provides the Linux backend for spibus: it opens and configures
//! `/dev/spidevX.Y` character devices and submits transfers with the
//! `SPI_IOC_MESSAGE(n)` ioctl.
//!
//! # Overview
//!
//! The Linux SPI driver exposes SPI controllers through character devices
//! at `/dev/spidevX.Y` where X is the bus number and Y is the chip select.
//! The kernel toggles chip-select between separate ioctl calls, so long
//! transfers that get split into chunks can optionally drive chip-select from
//! a GPIO line instead (see [`GpioChipSelect`]).
//!
//! # Example
//!
//! ```no_run
//! use spibus_core::{BusConfig, Mode, SpiBus};
//! use spibus_linux::{GpioChipSelect, GpioChipSelectConfig, SpidevConnector};
//!
//! let bus = SpiBus::new(SpidevConnector);
//! bus.init(
//!     &BusConfig::new("/dev/spidev0.0")
//!         .with_speed(4_000_000)
//!         .with_mode(Mode::Mode3),
//! )?;
//!
//! // Hold chip-select on GPIO 25 for the whole transfer
//! let cs = GpioChipSelect::open(&GpioChipSelectConfig::new("/dev/gpiochip0", 25))?;
//! bus.set_chip_select_hook(cs);
//!
//! // Read the WHO_AM_I register
//! let mut id = [0u8; 1];
//! bus.read_reg(0x8F, &mut id)?;
//! println!("WHO_AM_I: {:02X}", id[0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with spibus CLI
//!
//! ```bash
//! # Read 16 bytes from register 0x0F
//! spibus read-reg -p linux_spi:dev=/dev/spidev0.0 --reg 0x0F --len 16
//!
//! # Specify SPI speed in kHz and mode
//! spibus write -p linux_spi:dev=/dev/spidev0.0,spispeed=4000,mode=3 0xDEADBEEF
//!
//! # Chunk by the kernel buffer size, chip-select on gpiochip0 line 25
//! spibus read -p linux_spi:dev=/dev/spidev0.0,chunk=auto,cs_gpio=0:25 --len 65536
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - For GPIO chip-select, access to `/dev/gpiochipN`

pub mod device;
pub mod error;
pub mod gpio;

// Re-exports
pub use device::{
    chunk_limit, kernel_buf_size, parse_options, LinuxSpiOptions, Spidev, SpidevConnector, TransferLimit,
};
pub use error::{LinuxSpiError, Result};
pub use gpio::{GpioChipSelect, GpioChipSelectConfig};

use spibus_core::SpiBus;

/// Open a Linux SPI session from parsed options
pub fn open(options: &LinuxSpiOptions) -> Result<SpiBus<SpidevConnector>> {
    let bus = SpiBus::new(SpidevConnector);
    bus.init(&options.config)?;
    bus.set_max_transfer_len(options.limit.resolve());

    if let Some(cs) = &options.cs_gpio {
        bus.set_chip_select_hook(GpioChipSelect::open(cs)?);
    }

    Ok(bus)
}

/// Open a Linux SPI session
///
/// This is a convenience function for use in the CLI backend dispatch.
///
/// # Arguments
///
/// * `options` - Slice of (key, value) pairs from backend string parsing
///
/// # Example Options
///
/// - `dev=/dev/spidev0.0` - Required: device path
/// - `spispeed=4000` - Optional: speed in kHz (default: 2000)
/// - `mode=0` - Optional: SPI mode 0-3 (default: 0)
/// - `bits=8` - Optional: bits per word (default: 8)
/// - `chunk=4096` - Optional: bytes per transfer, or `auto` (default: 4096)
/// - `cs_gpio=0:25` - Optional: GPIO chip-select line
pub fn open_linux_spi(
    options: &[(&str, &str)],
) -> std::result::Result<SpiBus<SpidevConnector>, Box<dyn std::error::Error>> {
    let options = parse_options(options)?;
    Ok(open(&options)?)
}
