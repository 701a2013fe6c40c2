//! GPIO chip-select
//!
//! Drives one GPIO line through the Linux GPIO character device so that
//! chip-select stays asserted across every chunk of a logical transfer.

use crate::error::{LinuxSpiError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use spibus_core::ChipSelect;

use std::io;

/// Configuration for a GPIO chip-select line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioChipSelectConfig {
    /// GPIO chip device path (e.g., "/dev/gpiochip0")
    pub chip: String,
    /// Line offset on the chip
    pub line: Offset,
    /// Whether the line is driven low to assert (default: true)
    pub active_low: bool,
}

impl GpioChipSelectConfig {
    /// Create an active-low configuration for `line` on `chip`
    pub fn new(chip: impl Into<String>, line: Offset) -> Self {
        Self {
            chip: chip.into(),
            line,
            active_low: true,
        }
    }

    /// Set the line polarity
    pub fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    /// Parse `<chip>:<line>`, where `<chip>` is a path or a chip number
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let (chip, line) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid cs_gpio value: {} (expected <chip>:<line>)", s))?;

        let line: Offset = line
            .parse()
            .map_err(|_| format!("Invalid GPIO line number: {}", line))?;

        if chip.is_empty() {
            return Err(format!("Invalid cs_gpio value: {} (missing chip)", s));
        }

        let chip = if chip.bytes().all(|b| b.is_ascii_digit()) {
            format!("/dev/gpiochip{}", chip)
        } else {
            chip.to_string()
        };

        Ok(Self::new(chip, line))
    }
}

/// Chip-select driven from a GPIO line
pub struct GpioChipSelect {
    /// GPIO line request handle
    request: Request,
    /// Line offset
    line: Offset,
}

impl GpioChipSelect {
    /// Request the line as an output, initially deasserted
    pub fn open(config: &GpioChipSelectConfig) -> Result<Self> {
        if config.chip.is_empty() {
            return Err(LinuxSpiError::InvalidParameter(
                "GPIO chip cannot be empty".into(),
            ));
        }

        let mut req_config = Config::default();
        req_config.with_line(config.line).as_output(Value::Inactive);
        if config.active_low {
            req_config.as_active_low();
        }

        let request = Request::from_config(req_config)
            .on_chip(&config.chip)
            .with_consumer("spibus-cs")
            .request()
            .map_err(|source| LinuxSpiError::LineRequestFailed {
                chip: config.chip.clone(),
                line: config.line,
                source,
            })?;

        log::info!(
            "gpio_cs: Using {} line {} ({})",
            config.chip,
            config.line,
            if config.active_low {
                "active low"
            } else {
                "active high"
            }
        );

        Ok(Self {
            request,
            line: config.line,
        })
    }
}

impl ChipSelect for GpioChipSelect {
    fn set(&mut self, asserted: bool) -> io::Result<()> {
        let value = if asserted {
            Value::Active
        } else {
            Value::Inactive
        };

        self.request
            .set_value(self.line, value)
            .map(|_| ())
            .map_err(io::Error::other)
    }
}
