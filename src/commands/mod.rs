//! CLI command implementations
//!
//! Every transfer command is turned into an [`Operation`] and executed on an
//! open bus session, whatever backend provides it.

mod dump;
mod list;

use dump::hex_dump;
pub use list::list_backends;

use crate::backends::{backend_help, find_backend, parse_backend_string};

use spibus_core::{Connector, SpiBus};
use std::path::{Path, PathBuf};

/// One bus operation requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Raw write
    Write(Vec<u8>),
    /// Raw read
    Read {
        len: usize,
        output: Option<PathBuf>,
    },
    /// Raw full-duplex transfer
    Transfer {
        data: Vec<u8>,
        len: usize,
        output: Option<PathBuf>,
    },
    /// Addressed write
    WriteReg { reg: u8, data: Vec<u8> },
    /// Addressed read
    ReadReg {
        reg: u8,
        len: usize,
        output: Option<PathBuf>,
    },
    /// Addressed full-duplex transfer
    TransferReg {
        reg: u8,
        data: Vec<u8>,
        len: usize,
        output: Option<PathBuf>,
    },
}

/// Open the backend named in `backend` and run `op` on it
#[allow(unused_variables)]
pub fn run(backend: &str, op: &Operation) -> Result<(), Box<dyn std::error::Error>> {
    let (name, options) = parse_backend_string(backend);

    match find_backend(name) {
        #[cfg(feature = "dummy")]
        Some("dummy") => {
            let bus = spibus_dummy::open_dummy(&options)
                .map_err(|e| format!("Invalid dummy parameters: {}", e))?;
            execute(&bus, op)
        }

        #[cfg(feature = "linux-spi")]
        Some("linux_spi") => {
            log::info!("Opening Linux SPI backend...");

            let options = spibus_linux::parse_options(&options)
                .map_err(|e| format!("Invalid linux_spi parameters: {}", e))?;

            let bus = spibus_linux::open(&options).map_err(|e| {
                format!(
                    "Failed to open Linux SPI device: {}\n\
                     Make sure the device exists and you have read/write permissions.\n\
                     You may need to: sudo usermod -aG spi $USER",
                    e
                )
            })?;

            execute(&bus, op)
        }

        _ => Err(unknown_backend_error(name)),
    }
}

fn unknown_backend_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown backend: {}\n\n", name);
    msg.push_str(&backend_help());
    msg.push_str("\nUse 'spibus list-backends' for more details");
    msg.into()
}

/// Execute `op` on an open bus
pub fn execute<C: Connector>(
    bus: &SpiBus<C>,
    op: &Operation,
) -> Result<(), Box<dyn std::error::Error>> {
    match op {
        Operation::Write(data) => {
            bus.write(data)?;
            log::info!("Wrote {} bytes", data.len());
        }
        Operation::Read { len, output } => {
            let mut buf = vec![0u8; *len];
            bus.read(&mut buf)?;
            emit(&buf, output.as_deref())?;
        }
        Operation::Transfer { data, len, output } => {
            let mut buf = vec![0u8; *len];
            bus.transfer(data, &mut buf)?;
            emit(&buf, output.as_deref())?;
        }
        Operation::WriteReg { reg, data } => {
            bus.write_reg(*reg, data)?;
            log::info!("Wrote {} bytes to register 0x{:02X}", data.len(), reg);
        }
        Operation::ReadReg { reg, len, output } => {
            let mut buf = vec![0u8; *len];
            bus.read_reg(*reg, &mut buf)?;
            emit(&buf, output.as_deref())?;
        }
        Operation::TransferReg {
            reg,
            data,
            len,
            output,
        } => {
            let mut buf = vec![0u8; *len];
            bus.transfer_reg(*reg, data, &mut buf)?;
            emit(&buf, output.as_deref())?;
        }
    }

    Ok(())
}

/// Write received bytes to a file, or print them as a hex dump
fn emit(data: &[u8], output: Option<&Path>) -> std::io::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, data)?;
            log::info!("Wrote {} bytes to {}", data.len(), path.display());
        }
        None => print!("{}", hex_dump(data)),
    }
    Ok(())
}
