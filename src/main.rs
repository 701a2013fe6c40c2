//! spibus - chunked SPI bus transfers
//!
//! Command-line front end for the `spibus-core` session: every command opens
//! a backend, performs one logical transfer and prints or saves the bytes
//! clocked in.
//!
//! # Architecture
//!
//! All commands go through the same [`spibus_core::SpiBus`] session, so the
//! chunking, chip-select handling and error codes are identical whether the
//! bytes end up on a spidev device or in the in-memory dummy bus.

mod backends;
mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Operation;

/// Full-duplex length, defaulting to the write length
fn duplex_len(data: &[u8], len: Option<usize>) -> usize {
    len.unwrap_or(data.len())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let (backend, op) = match cli.command {
        Commands::ListBackends => {
            commands::list_backends();
            return Ok(());
        }
        Commands::Write { backend, data } => (backend, Operation::Write(data.0)),
        Commands::Read {
            backend,
            len,
            output,
        } => (
            backend,
            Operation::Read {
                len,
                output: output.output,
            },
        ),
        Commands::Transfer {
            backend,
            data,
            len,
            output,
        } => {
            let len = duplex_len(&data.0, len);
            (
                backend,
                Operation::Transfer {
                    data: data.0,
                    len,
                    output: output.output,
                },
            )
        }
        Commands::WriteReg { backend, reg, data } => (
            backend,
            Operation::WriteReg { reg, data: data.0 },
        ),
        Commands::ReadReg {
            backend,
            reg,
            len,
            output,
        } => (
            backend,
            Operation::ReadReg {
                reg,
                len,
                output: output.output,
            },
        ),
        Commands::TransferReg {
            backend,
            reg,
            data,
            len,
            output,
        } => {
            let len = duplex_len(&data.0, len);
            (
                backend,
                Operation::TransferReg {
                    reg,
                    data: data.0,
                    len,
                    output: output.output,
                },
            )
        }
    };

    if let Err(e) = commands::run(&backend, &op) {
        if let Some(err) = e.downcast_ref::<spibus_core::Error>() {
            eprintln!("Error: {} (code {})", err, err.code());
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}
