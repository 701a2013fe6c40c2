//! spibus-core - Chunked SPI transfer engine
//!
//! This crate provides [`SpiBus`], a mutex-guarded session over a single SPI
//! bus device. Every logical transfer is split into chunks no larger than the
//! configured maximum transfer length, and an optional chip-select hook is
//! driven around the whole logical transfer rather than around each chunk.
//!
//! Backends plug in through two traits:
//!
//! - [`Connector`] opens and configures a device for a [`BusConfig`]
//! - [`Transport`] submits one batch of [`Descriptor`]s atomically
//!
//! # Example
//!
//! ```ignore
//! use spibus_core::{BusConfig, Mode, SpiBus};
//!
//! let bus = SpiBus::new(connector);
//! bus.init(&BusConfig::new("/dev/spidev0.0").with_mode(Mode::Mode3))?;
//!
//! // Read three bytes from register 0x2A
//! let mut id = [0u8; 3];
//! bus.read_reg(0x2A, &mut id)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bus;
pub mod chip_select;
pub mod config;
pub mod error;
pub mod transfer;

pub use bus::{SpiBus, DEFAULT_MAX_TRANSFER_LEN};
pub use chip_select::{ChipSelect, ChipSelectControl};
pub use config::{BusConfig, Mode, ModeFlags};
pub use error::{ConfigStep, Error, Result, StagingBuffer};
pub use transfer::{Chunk, Chunks, Connector, Descriptor, Transport};
