//! Linux spidev device implementation
//!
//! This module provides [`SpidevConnector`], which opens and configures
//! `/dev/spidevX.Y` nodes, and [`Spidev`], which submits descriptor batches
//! with the `SPI_IOC_MESSAGE(n)` ioctl.

use crate::gpio::GpioChipSelectConfig;

use spibus_core::{
    BusConfig, ConfigStep, Connector, Descriptor, Error, Mode, Result, Transport,
    DEFAULT_MAX_TRANSFER_LEN,
};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Bytes the register address adds to the first message of a transfer
const ADDRESS_LEN: usize = 1;

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_read;
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_read!(spi_ioc_rd_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_read!(
        spi_ioc_rd_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    ///
    /// SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(struct spi_ioc_transfer)])
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * std::mem::size_of::<super::SpiIocTransfer>();
        // _IOC(dir, type, nr, size) = ((dir)<<30)|((size)<<16)|((type)<<8)|(nr), _IOC_WRITE = 1
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

impl SpiIocTransfer {
    /// Build the kernel descriptor; zero speed and word size mean "device default"
    fn from_descriptor(d: &mut Descriptor<'_>) -> io::Result<Self> {
        let len = u32::try_from(d.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("transfer of {} bytes too large", d.len()),
            )
        })?;

        Ok(Self {
            tx_buf: d.tx().map_or(0, |b| b.as_ptr() as u64),
            rx_buf: d.rx().map_or(0, |b| b.as_mut_ptr() as u64),
            len,
            cs_change: d.cs_change() as u8,
            ..Default::default()
        })
    }
}

/// Connector opening Linux spidev devices
#[derive(Debug, Clone, Copy, Default)]
pub struct SpidevConnector;

impl Connector for SpidevConnector {
    type Device = Spidev;

    fn connect(&mut self, config: &BusConfig) -> Result<Spidev> {
        Spidev::open(config)
    }
}

/// An open spidev device
///
/// Dropping it closes the file descriptor.
#[derive(Debug)]
pub struct Spidev {
    /// File handle for spidev device
    file: File,
}

fn step_failed(step: ConfigStep) -> impl FnOnce(nix::errno::Errno) -> Error {
    move |e| Error::Configure {
        step,
        source: io::Error::from_raw_os_error(e as i32),
    }
}

impl Spidev {
    /// Open and configure a spidev device
    ///
    /// Mode, speed and word size are each written and then read back; every
    /// ioctl reports its own [`ConfigStep`] on failure.
    pub fn open(config: &BusConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(Error::NoDevice);
        }

        log::debug!("spidev: Opening device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| Error::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        let fd = file.as_raw_fd();

        let mut mode = config.mode.bits();
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(step_failed(ConfigStep::WriteMode))?;
            ioctl::spi_ioc_rd_mode(fd, &mut mode).map_err(step_failed(ConfigStep::ReadMode))?;
        }

        let mut speed = config.speed_hz;
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed)
                .map_err(step_failed(ConfigStep::WriteSpeed))?;
            ioctl::spi_ioc_rd_max_speed_hz(fd, &mut speed)
                .map_err(step_failed(ConfigStep::ReadSpeed))?;
        }

        let mut bits = config.bits_per_word;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits)
                .map_err(step_failed(ConfigStep::WriteBitsPerWord))?;
            ioctl::spi_ioc_rd_bits_per_word(fd, &mut bits)
                .map_err(step_failed(ConfigStep::ReadBitsPerWord))?;
        }

        if mode != config.mode.bits() {
            log::warn!(
                "spidev: Requested mode {} but device reports {}",
                config.mode,
                mode
            );
        }
        if speed != config.speed_hz {
            log::warn!(
                "spidev: Requested {} Hz but device reports {} Hz",
                config.speed_hz,
                speed
            );
        }

        log::info!(
            "spidev: Opened {} (mode={}, speed={} kHz, bits={})",
            config.device,
            mode,
            speed / 1000,
            bits
        );

        Ok(Self { file })
    }
}

impl Transport for Spidev {
    fn transfer(&mut self, descriptors: &mut [Descriptor<'_>]) -> io::Result<()> {
        let n = u8::try_from(descriptors.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "too many descriptors")
        })?;

        let transfers = descriptors
            .iter_mut()
            .map(SpiIocTransfer::from_descriptor)
            .collect::<io::Result<Vec<_>>>()?;

        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::spi_ioc_message(n),
                transfers.as_ptr(),
            )
        };

        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
pub fn kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("spidev: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("spidev: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("spidev: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    page_buf_size(unsafe { libc::sysconf(libc::_SC_PAGESIZE) })
}

/// Buffer size from a `sysconf(_SC_PAGESIZE)` result
fn page_buf_size(page_size: libc::c_long) -> usize {
    match usize::try_from(page_size) {
        Ok(size) if size > 0 => {
            log::debug!("spidev: Using page size {} as buffer size", size);
            size
        }
        _ => {
            log::warn!(
                "spidev: Cannot query page size, using {} bytes",
                DEFAULT_MAX_TRANSFER_LEN
            );
            DEFAULT_MAX_TRANSFER_LEN
        }
    }
}

/// Largest chunk whose addressed first message still fits in `buf_size`
///
/// spidev rejects a message larger than its buffer, and the first message of
/// an addressed transfer carries the register byte on top of the chunk.
pub fn chunk_limit(buf_size: usize) -> usize {
    buf_size.saturating_sub(ADDRESS_LEN).max(1)
}

/// Maximum transfer length option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLimit {
    /// Fixed number of bytes (0 selects the session default)
    Fixed(usize),
    /// Kernel spidev buffer size, less the register address byte
    Kernel,
}

impl Default for TransferLimit {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

impl TransferLimit {
    /// Resolve to a byte count
    pub fn resolve(self) -> usize {
        match self {
            Self::Fixed(n) => n,
            Self::Kernel => chunk_limit(kernel_buf_size()),
        }
    }
}

/// Options for opening a Linux SPI session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinuxSpiOptions {
    /// Device configuration
    pub config: BusConfig,
    /// Maximum bytes per primitive transfer
    pub limit: TransferLimit,
    /// GPIO line driven as chip-select, if any
    pub cs_gpio: Option<GpioChipSelectConfig>,
}

/// Parse backend options from a list of key-value pairs
///
/// - `dev=/dev/spidevX.Y` - device path (required)
/// - `spispeed=<kHz>` - clock speed (default 2000)
/// - `mode=<0-3>` - SPI mode (default 0)
/// - `bits=<n>` - bits per word (default 8)
/// - `chunk=<n|auto>` - bytes per transfer; `auto` fits the kernel buffer size
/// - `cs_gpio=<chip>:<line>` - drive chip-select from a GPIO line
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxSpiOptions, String> {
    let mut opts = LinuxSpiOptions::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                opts.config.device = value.to_string();
            }
            "spispeed" => {
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid spispeed value: {}", value))?;
                opts.config.speed_hz = speed_khz
                    .checked_mul(1000)
                    .ok_or_else(|| format!("spispeed too large: {}", value))?;
            }
            "mode" => {
                let n: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                opts.config.mode = Mode::from_number(n)
                    .ok_or_else(|| format!("Invalid SPI mode: {} (must be 0-3)", n))?;
            }
            "bits" => {
                opts.config.bits_per_word = value
                    .parse()
                    .map_err(|_| format!("Invalid bits value: {}", value))?;
            }
            "chunk" => {
                opts.limit = if *value == "auto" {
                    TransferLimit::Kernel
                } else {
                    TransferLimit::Fixed(
                        value
                            .parse()
                            .map_err(|_| format!("Invalid chunk value: {}", value))?,
                    )
                };
            }
            "cs_gpio" => {
                opts.cs_gpio = Some(GpioChipSelectConfig::parse(value)?);
            }
            _ => {
                log::warn!("spidev: Unknown option: {}={}", key, value);
            }
        }
    }

    if opts.config.device.is_empty() {
        return Err("No device specified. Use dev=/dev/spidevX.Y".to_string());
    }

    Ok(opts)
}
