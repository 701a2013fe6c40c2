//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Help text for the backend argument
const BACKEND_HELP: &str = "Backend to use, e.g. linux_spi:dev=/dev/spidev0.0,spispeed=4000 \
                            or dummy (see list-backends)";

/// Hex-encoded byte string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse hex bytes such as "0xDEADBEEF", "de:ad:be:ef" or "de ad be ef"
fn parse_hex_bytes(s: &str) -> Result<HexBytes, String> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let digits: String = s
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | ',' | '_' | '-'))
        .collect();

    if digits.is_empty() {
        return Err("No data given".to_string());
    }
    if !digits.is_ascii() {
        return Err(format!("Invalid hex data: {}", s));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits: {}", digits.len()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("Invalid hex byte: {}", &digits[i..i + 2]))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

#[derive(Parser)]
#[command(name = "spibus")]
#[command(author, version, about = "Chunked SPI bus transfers over spidev", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output options shared by commands that read data
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Write the received bytes to this file instead of printing a hex dump
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write data to a device without a register address
    Write {
        #[arg(short = 'p', long, help = BACKEND_HELP)]
        backend: String,

        /// Data to write (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },

    /// Read data from a device without a register address
    Read {
        #[arg(short = 'p', long, help = BACKEND_HELP)]
        backend: String,

        /// Number of bytes to read
        #[arg(short, long)]
        len: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Full-duplex transfer on a device without a register address
    Transfer {
        #[arg(short = 'p', long, help = BACKEND_HELP)]
        backend: String,

        /// Data to write (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,

        /// Number of bytes to keep (defaults to the write length)
        #[arg(short, long)]
        len: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Write data to a register
    WriteReg {
        #[arg(short = 'p', long, help = BACKEND_HELP)]
        backend: String,

        /// Register address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u8)]
        reg: u8,

        /// Data to write (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },

    /// Read data from a register
    ReadReg {
        #[arg(short = 'p', long, help = BACKEND_HELP)]
        backend: String,

        /// Register address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u8)]
        reg: u8,

        /// Number of bytes to read
        #[arg(short, long)]
        len: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Full-duplex transfer after sending a register address
    TransferReg {
        #[arg(short = 'p', long, help = BACKEND_HELP)]
        backend: String,

        /// Register address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u8)]
        reg: u8,

        /// Data to write (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,

        /// Number of bytes to keep (defaults to the write length)
        #[arg(short, long)]
        len: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List supported backends
    ListBackends,
}
