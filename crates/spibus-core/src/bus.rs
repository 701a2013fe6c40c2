//! Bus session
//!
//! [`SpiBus`] owns one device, one chip-select setting and one chunk limit
//! behind a single mutex. Every transfer and every reconfiguration holds the
//! lock for its whole duration, so one session can be shared between threads.

use crate::chip_select::{ChipSelect, ChipSelectControl};
use crate::config::BusConfig;
use crate::error::{Error, Result, StagingBuffer};
use crate::transfer::{Chunks, Connector, Descriptor, Transport};

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default maximum bytes per primitive transfer
pub const DEFAULT_MAX_TRANSFER_LEN: usize = 4096;

const DEFAULT_LIMIT: NonZeroUsize = match NonZeroUsize::new(DEFAULT_MAX_TRANSFER_LEN) {
    Some(n) => n,
    None => unreachable!(),
};

/// State protected by the session lock
struct Inner<C: Connector> {
    connector: C,
    device: Option<C::Device>,
    chip_select: ChipSelectControl,
    max_transfer_len: NonZeroUsize,
}

/// Lock-guarded SPI bus session
///
/// The session starts closed. Call [`SpiBus::init`] to open the device; it
/// may be called again at any time to close and reopen it.
pub struct SpiBus<C: Connector> {
    inner: Mutex<Inner<C>>,
}

/// Payload of one logical transfer
enum Payload<'a> {
    Write(&'a [u8]),
    Read(&'a mut [u8]),
    Duplex { tx: &'a [u8], rx: &'a mut [u8] },
}

impl Payload<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Write(tx) => tx.len(),
            Self::Read(rx) => rx.len(),
            Self::Duplex { tx, .. } => tx.len(),
        }
    }

    fn descriptor(&mut self, range: Range<usize>) -> Descriptor<'_> {
        match self {
            Self::Write(tx) => Descriptor::write(&tx[range]),
            Self::Read(rx) => Descriptor::read(&mut rx[range]),
            Self::Duplex { tx, rx } => Descriptor::duplex(&tx[range.clone()], &mut rx[range]),
        }
    }
}

impl<C: Connector> SpiBus<C> {
    /// Create a closed session using `connector` to open devices
    pub fn new(connector: C) -> Self {
        Self {
            inner: Mutex::new(Inner {
                connector,
                device: None,
                chip_select: ChipSelectControl::External,
                max_transfer_len: DEFAULT_LIMIT,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        // Transfers leave no half-updated fields behind, so a panic in
        // another caller does not invalidate the session.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open and configure the device
    ///
    /// Any previously open device is closed first. On failure the session is
    /// left closed.
    pub fn init(&self, config: &BusConfig) -> Result<()> {
        let mut inner = self.lock();

        if inner.device.take().is_some() {
            log::debug!("spibus: Closed previous device before reopening");
        }

        let device = inner.connector.connect(config)?;
        inner.device = Some(device);

        log::debug!(
            "spibus: Session ready on {} (chunk limit {} bytes)",
            config.device,
            inner.max_transfer_len
        );
        Ok(())
    }

    /// Close the device
    ///
    /// Returns `true` if a device was open.
    pub fn close(&self) -> bool {
        let closed = self.lock().device.take().is_some();
        if closed {
            log::debug!("spibus: Closed device");
        }
        closed
    }

    /// Whether a device is currently open
    pub fn is_open(&self) -> bool {
        self.lock().device.is_some()
    }

    /// Replace the chip-select control
    pub fn set_chip_select(&self, control: ChipSelectControl) {
        self.lock().chip_select = control;
    }

    /// Drive chip-select through `hook` around every logical transfer
    pub fn set_chip_select_hook(&self, hook: impl ChipSelect + 'static) {
        self.set_chip_select(ChipSelectControl::hook(hook));
    }

    /// Leave chip-select to the kernel driver or external hardware
    pub fn clear_chip_select(&self) {
        self.set_chip_select(ChipSelectControl::External);
    }

    /// Set the maximum bytes per primitive transfer
    ///
    /// `0` selects [`DEFAULT_MAX_TRANSFER_LEN`].
    pub fn set_max_transfer_len(&self, len: usize) {
        let limit = NonZeroUsize::new(len).unwrap_or(DEFAULT_LIMIT);
        self.lock().max_transfer_len = limit;
        log::debug!("spibus: Max transfer length set to {} bytes", limit);
    }

    /// Current maximum bytes per primitive transfer
    pub fn max_transfer_len(&self) -> usize {
        self.lock().max_transfer_len.get()
    }

    /// Write `data` to a device without a register address
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyWriteBuffer);
        }
        self.execute(None, Payload::Write(data))
    }

    /// Fill `buf` from a device without a register address
    pub fn read(&self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(Error::EmptyReadBuffer);
        }
        self.execute(None, Payload::Read(buf))
    }

    /// Full-duplex transfer on a device without a register address
    ///
    /// Clocks `max(write.len(), read.len())` bytes. Transmitted bytes past the
    /// end of `write` are zero, and only the first `read.len()` received
    /// bytes are kept.
    pub fn transfer(&self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.duplex(None, write, read)
    }

    /// Write `data` to register `reg`
    ///
    /// The register byte and the first chunk go out in one primitive call;
    /// later chunks carry payload only.
    pub fn write_reg(&self, reg: u8, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyWriteBuffer);
        }
        self.execute(Some(reg), Payload::Write(data))
    }

    /// Read from register `reg` into `buf`
    pub fn read_reg(&self, reg: u8, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(Error::EmptyReadBuffer);
        }
        self.execute(Some(reg), Payload::Read(buf))
    }

    /// Full-duplex transfer after sending register `reg`
    pub fn transfer_reg(&self, reg: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.duplex(Some(reg), write, read)
    }

    fn execute(&self, address: Option<u8>, payload: Payload<'_>) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let device = inner.device.as_mut().ok_or(Error::NotOpen)?;

        run(
            device,
            &mut inner.chip_select,
            inner.max_transfer_len,
            address,
            payload,
        )
    }

    fn duplex(&self, address: Option<u8>, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.duplex_with(address, write, read, staging)
    }

    fn duplex_with(
        &self,
        address: Option<u8>,
        write: &[u8],
        read: &mut [u8],
        alloc: impl Fn(usize, StagingBuffer) -> Result<Vec<u8>>,
    ) -> Result<()> {
        if write.is_empty() {
            return Err(Error::EmptyWriteBuffer);
        }
        if read.is_empty() {
            return Err(Error::EmptyReadBuffer);
        }

        let mut guard = self.lock();
        let inner = &mut *guard;
        let device = inner.device.as_mut().ok_or(Error::NotOpen)?;

        let len = write.len().max(read.len());
        let mut tx = alloc(len, StagingBuffer::Transmit)?;
        tx[..write.len()].copy_from_slice(write);
        let mut rx = alloc(len, StagingBuffer::Receive)?;

        run(
            device,
            &mut inner.chip_select,
            inner.max_transfer_len,
            address,
            Payload::Duplex {
                tx: &tx,
                rx: &mut rx,
            },
        )?;

        read.copy_from_slice(&rx[..read.len()]);
        Ok(())
    }
}

/// Allocate a zero-filled staging buffer without aborting on failure
fn staging(len: usize, buffer: StagingBuffer) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::StagingAlloc { buffer, len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Run one logical transfer inside a single chip-select window
fn run<T: Transport + ?Sized>(
    device: &mut T,
    chip_select: &mut ChipSelectControl,
    limit: NonZeroUsize,
    address: Option<u8>,
    mut payload: Payload<'_>,
) -> Result<()> {
    chip_select.set(true).map_err(Error::ChipSelectAssert)?;

    let result = pump(device, limit, address, &mut payload);

    match (result, chip_select.set(false)) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(e)) => Err(Error::ChipSelectDeassert(e)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cs)) => {
            log::warn!("spibus: Chip-select deassert failed after error: {}", cs);
            Err(e)
        }
    }
}

/// Issue one primitive call per chunk
///
/// With an address, the first call is `[address, first chunk]`; every other
/// call carries a single payload descriptor.
fn pump<T: Transport + ?Sized>(
    device: &mut T,
    limit: NonZeroUsize,
    address: Option<u8>,
    payload: &mut Payload<'_>,
) -> Result<()> {
    let total = payload.len();
    let mut remaining = total;

    for chunk in Chunks::new(total, limit) {
        log::trace!(
            "spibus: Chunk {} offset={} len={}",
            chunk.index,
            chunk.offset,
            chunk.len
        );

        let data = payload.descriptor(chunk.range());
        let result = match address {
            Some(reg) if chunk.is_first() => {
                let header = [reg];
                device.transfer(&mut [Descriptor::write(&header), data])
            }
            _ => device.transfer(&mut [data]),
        };

        result.map_err(|source| Error::TransferFailed {
            chunk: chunk.index,
            source,
        })?;
        remaining -= chunk.len;
    }

    if remaining != 0 {
        return Err(Error::Incomplete { remaining });
    }

    Ok(())
}
