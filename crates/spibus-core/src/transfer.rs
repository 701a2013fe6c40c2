//! Transfer descriptors, chunk planning and backend traits

use crate::config::BusConfig;
use crate::error::Result;

use std::io;
use std::num::NonZeroUsize;
use std::ops::Range;

/// One segment of a primitive transfer
///
/// A descriptor borrows the transmit and/or receive buffer for a single chunk.
/// When both are present they have the same length, and the bus clocks out
/// `tx` while clocking into `rx`.
#[derive(Debug)]
pub struct Descriptor<'a> {
    tx: Option<&'a [u8]>,
    rx: Option<&'a mut [u8]>,
    len: usize,
    cs_change: bool,
}

impl<'a> Descriptor<'a> {
    /// Transmit-only descriptor
    pub fn write(tx: &'a [u8]) -> Self {
        Self {
            len: tx.len(),
            tx: Some(tx),
            rx: None,
            cs_change: false,
        }
    }

    /// Receive-only descriptor
    pub fn read(rx: &'a mut [u8]) -> Self {
        Self {
            len: rx.len(),
            tx: None,
            rx: Some(rx),
            cs_change: false,
        }
    }

    /// Full-duplex descriptor
    ///
    /// Both buffers are cut to the shorter of the two lengths.
    pub fn duplex(tx: &'a [u8], rx: &'a mut [u8]) -> Self {
        let len = tx.len().min(rx.len());
        let (tx, rx) = (&tx[..len], &mut rx[..len]);
        Self {
            len,
            tx: Some(tx),
            rx: Some(rx),
            cs_change: false,
        }
    }

    /// Number of bytes clocked by this descriptor
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this descriptor clocks no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Transmit buffer, if any
    pub fn tx(&self) -> Option<&[u8]> {
        self.tx
    }

    /// Receive buffer, if any
    pub fn rx(&mut self) -> Option<&mut [u8]> {
        self.rx.as_deref_mut()
    }

    /// Whether the receive side is present
    pub fn has_rx(&self) -> bool {
        self.rx.is_some()
    }

    /// Whether chip-select toggles between this and the next descriptor
    ///
    /// Always `false` for descriptors built by the bus session, which drives
    /// chip-select around the whole logical transfer instead.
    pub fn cs_change(&self) -> bool {
        self.cs_change
    }
}

/// Primitive transfer collaborator
///
/// Submits a batch of descriptors as one atomic operation on the bus. The
/// batch holds one descriptor for plain chunks and two for the first chunk of
/// an addressed transfer.
pub trait Transport {
    /// Execute all descriptors in a single call
    fn transfer(&mut self, descriptors: &mut [Descriptor<'_>]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, descriptors: &mut [Descriptor<'_>]) -> io::Result<()> {
        (**self).transfer(descriptors)
    }
}

/// Device configuration collaborator
///
/// Opens and configures a bus device. Dropping the returned device closes it.
pub trait Connector {
    /// Device type produced by this connector
    type Device: Transport;

    /// Open the device described by `config`
    fn connect(&mut self, config: &BusConfig) -> Result<Self::Device>;
}

/// One chunk of a logical transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk number
    pub index: usize,
    /// Byte offset into the logical transfer
    pub offset: usize,
    /// Chunk length in bytes
    pub len: usize,
    first: bool,
}

impl Chunk {
    /// Byte range covered by this chunk
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Whether this is the first chunk of the logical transfer
    pub fn is_first(&self) -> bool {
        self.first
    }
}

/// Iterator splitting a logical transfer into chunks
///
/// Yields `ceil(total / limit)` chunks of `min(remaining, limit)` bytes with
/// strictly increasing offsets.
#[derive(Debug, Clone)]
pub struct Chunks {
    total: usize,
    limit: usize,
    remaining: usize,
    index: usize,
}

impl Chunks {
    /// Plan a transfer of `total` bytes with at most `limit` bytes per chunk
    pub fn new(total: usize, limit: NonZeroUsize) -> Self {
        Self {
            total,
            limit: limit.get(),
            remaining: total,
            index: 0,
        }
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }

        let len = self.remaining.min(self.limit);
        let chunk = Chunk {
            index: self.index,
            offset: self.total - self.remaining,
            len,
            first: self.remaining == self.total,
        };

        self.remaining -= len;
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.div_ceil(self.limit);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_chunks_10000_by_4096() {
        let chunks: Vec<Chunk> = Chunks::new(10000, limit(4096)).collect();
        let lens: Vec<usize> = chunks.iter().map(|c| c.len).collect();
        let offsets: Vec<usize> = chunks.iter().map(|c| c.offset).collect();

        assert_eq!(lens, [4096, 4096, 1808]);
        assert_eq!(offsets, [0, 4096, 8192]);
        assert!(chunks[0].is_first());
        assert!(!chunks[1].is_first());
        assert!(!chunks[2].is_first());
    }

    #[test]
    fn test_chunks_cover_range_exactly_once() {
        for total in [1usize, 2, 7, 63, 64, 65, 1000] {
            for lim in [1usize, 3, 64, 4096] {
                let chunks = Chunks::new(total, limit(lim));
                assert_eq!(chunks.len(), total.div_ceil(lim));

                let mut next = 0;
                for (i, chunk) in chunks.enumerate() {
                    assert_eq!(chunk.index, i);
                    assert_eq!(chunk.offset, next);
                    assert_eq!(chunk.len, (total - next).min(lim));
                    assert_eq!(chunk.is_first(), i == 0);
                    next = chunk.range().end;
                }
                assert_eq!(next, total);
            }
        }
    }

    #[test]
    fn test_single_chunk_is_first() {
        let chunks: Vec<Chunk> = Chunks::new(3, limit(4096)).collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_first());
        assert_eq!(chunks[0].range(), 0..3);
    }

    #[test]
    fn test_zero_length_has_no_chunks() {
        assert_eq!(Chunks::new(0, limit(16)).count(), 0);
    }

    #[test]
    fn test_descriptor_constructors() {
        let tx = [1u8, 2, 3];
        let mut rx = [0u8; 3];

        let d = Descriptor::write(&tx);
        assert_eq!(d.len(), 3);
        assert!(!d.has_rx());
        assert!(!d.cs_change());

        let mut d = Descriptor::read(&mut rx);
        assert!(d.tx().is_none());
        d.rx().unwrap()[0] = 0xAA;
        assert_eq!(rx[0], 0xAA);

        let d = Descriptor::duplex(&tx, &mut rx);
        assert_eq!(d.tx(), Some(&tx[..]));
        assert!(d.has_rx());
    }

    #[test]
    fn test_duplex_length_mismatch_uses_shorter() {
        let tx = [1u8, 2, 3, 4];
        let mut rx = [0u8; 2];

        let mut d = Descriptor::duplex(&tx, &mut rx);
        assert_eq!(d.len(), 2);
        assert_eq!(d.tx(), Some(&tx[..2]));
        assert_eq!(d.rx().map(|rx| rx.len()), Some(2));

        let mut short_tx = [0u8; 5];
        let d = Descriptor::duplex(&tx[..1], &mut short_tx);
        assert_eq!(d.len(), 1);
    }
}
