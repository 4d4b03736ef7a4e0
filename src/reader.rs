//! Host-capability reader with a small retained-segment cache
//!
//! This is the single suspension point described by the design: every byte
//! that reaches a parser passes through `Reader::read`, which either slices
//! a previously retained segment or calls out to the host-supplied
//! [`HostReader`]. Minimizing the number of host calls is a correctness
//! contract (see the read-minimality property), not just an optimization, so
//! `prefetch` exists to let a parser front-load one larger read before many
//! small ones.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Byte order used by the width-typed integer helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// The host capability this crate consumes: random-access byte retrieval
///
/// Implementations may back this with a file handle, an HTTP range request,
/// or an in-memory buffer -- the core contract does not distinguish. A
/// successful call must return exactly `length` bytes; fewer (including
/// zero) signals truncation and is turned into [`Error::TruncatedInput`] by
/// [`Reader`].
pub trait HostReader {
    /// Read `length` bytes starting at `offset`
    fn read(&mut self, offset: u64, length: u32) -> Result<Vec<u8>>;
}

impl<F> HostReader for F
where
    F: FnMut(u64, u32) -> Result<Vec<u8>>,
{
    fn read(&mut self, offset: u64, length: u32) -> Result<Vec<u8>> {
        (self)(offset, length)
    }
}

/// A [`HostReader`] backed by an in-memory byte buffer
///
/// Useful for hosts that have already buffered the file, and for tests.
pub struct MemoryHostReader<'a> {
    data: &'a [u8],
}

impl<'a> MemoryHostReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl HostReader for MemoryHostReader<'_> {
    fn read(&mut self, offset: u64, length: u32) -> Result<Vec<u8>> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(length as usize).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }
}

/// Wraps a [`HostReader`] with a small retained-segment cache
///
/// Segments are append-only for the lifetime of a request: once a range is
/// prefetched it is retained until the `Reader` is dropped. No eviction is
/// required because the total retained size is bounded by the owning
/// parser's prefetch plan.
pub struct Reader<'h> {
    host: &'h mut dyn HostReader,
    retained: Vec<(u64, Vec<u8>)>,
    byte_order: ByteOrder,
}

impl<'h> Reader<'h> {
    pub fn new(host: &'h mut dyn HostReader) -> Self {
        Self {
            host,
            retained: Vec::new(),
            byte_order: ByteOrder::Big,
        }
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.byte_order = order;
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Find a retained segment that fully contains `[offset, offset+length)`
    fn find_retained(&self, offset: u64, length: u32) -> Option<&[u8]> {
        let end = offset.checked_add(length as u64)?;
        for (start, bytes) in &self.retained {
            let seg_end = start + bytes.len() as u64;
            if *start <= offset && end <= seg_end {
                let rel = (offset - start) as usize;
                return Some(&bytes[rel..rel + length as usize]);
            }
        }
        None
    }

    /// Read `length` bytes at `offset`, serving from a retained segment when possible
    ///
    /// On a short host read this returns [`Error::TruncatedInput`] -- a
    /// partial read is always fatal for the range it was requested for.
    pub fn read(&mut self, offset: u64, length: u32) -> Result<Vec<u8>> {
        if let Some(slice) = self.find_retained(offset, length) {
            return Ok(slice.to_vec());
        }

        tracing::trace!(offset, length, "host read (uncached)");
        let bytes = self.host.read(offset, length)?;
        if bytes.len() != length as usize {
            return Err(Error::TruncatedInput {
                offset,
                requested: length,
                got: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Fetch and retain as much of `[offset, offset+length)` as the host has
    ///
    /// This is a best-effort hint, not a guarantee: a host may have fewer
    /// bytes than `length` (the file is simply smaller than the prefetch
    /// window), and that is not itself an error, whether the host reports it
    /// by returning a shorter-than-requested `Vec` or by erroring with
    /// [`Error::TruncatedInput`] -- both are treated as "nothing more to
    /// prefetch" rather than propagated. Reads that actually need bytes
    /// beyond what's available still fail with `TruncatedInput` through
    /// [`Reader::read`].
    pub fn prefetch(&mut self, offset: u64, length: u32) -> Result<()> {
        if self.find_retained(offset, length).is_some() {
            return Ok(());
        }

        tracing::trace!(offset, length, "prefetch");
        match self.host.read(offset, length) {
            Ok(bytes) => {
                if !bytes.is_empty() {
                    self.retained.push((offset, bytes));
                }
                Ok(())
            }
            Err(Error::TruncatedInput { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        Ok(self.read(offset, 1)?[0])
    }

    pub fn read_u16(&mut self, offset: u64) -> Result<u16> {
        let b = self.read(offset, 2)?;
        Ok(match self.byte_order {
            ByteOrder::Big => BigEndian::read_u16(&b),
            ByteOrder::Little => LittleEndian::read_u16(&b),
        })
    }

    pub fn read_u32(&mut self, offset: u64) -> Result<u32> {
        let b = self.read(offset, 4)?;
        Ok(match self.byte_order {
            ByteOrder::Big => BigEndian::read_u32(&b),
            ByteOrder::Little => LittleEndian::read_u32(&b),
        })
    }

    pub fn read_u64(&mut self, offset: u64) -> Result<u64> {
        let b = self.read(offset, 8)?;
        Ok(match self.byte_order {
            ByteOrder::Big => BigEndian::read_u64(&b),
            ByteOrder::Little => LittleEndian::read_u64(&b),
        })
    }

    /// Read a big-endian u16 regardless of the reader's configured byte order
    ///
    /// ISOBMFF box fields are always big-endian even when a TIFF payload
    /// elsewhere in the same request is little-endian.
    pub fn read_u16_be(&mut self, offset: u64) -> Result<u16> {
        Ok(BigEndian::read_u16(&self.read(offset, 2)?))
    }

    pub fn read_u32_be(&mut self, offset: u64) -> Result<u32> {
        Ok(BigEndian::read_u32(&self.read(offset, 4)?))
    }

    pub fn read_u64_be(&mut self, offset: u64) -> Result<u64> {
        Ok(BigEndian::read_u64(&self.read(offset, 8)?))
    }

    /// Read a 4-byte ASCII/4CC tag
    pub fn read_fourcc(&mut self, offset: u64) -> Result<[u8; 4]> {
        let b = self.read(offset, 4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retained_segment_serves_without_host_call() {
        let data = (0u8..=255).collect::<Vec<u8>>();
        struct CountingHost<'a> {
            data: &'a [u8],
            calls: usize,
        }
        impl HostReader for CountingHost<'_> {
            fn read(&mut self, offset: u64, length: u32) -> Result<Vec<u8>> {
                self.calls += 1;
                Ok(self.data[offset as usize..offset as usize + length as usize].to_vec())
            }
        }
        let mut host = CountingHost {
            data: &data,
            calls: 0,
        };
        let mut reader = Reader::new(&mut host);
        reader.prefetch(0, 64).unwrap();
        assert_eq!(reader.read(10, 20).unwrap(), data[10..30].to_vec());
        assert_eq!(host.calls, 1);
    }

    #[test]
    fn short_read_is_truncated_input() {
        let mut host = |_o: u64, _l: u32| Ok(vec![1, 2, 3]);
        let mut reader = Reader::new(&mut host);
        let err = reader.read(0, 10).unwrap_err();
        assert!(matches!(err, Error::TruncatedInput { .. }));
    }

    #[test]
    fn byte_order_controls_width_reads() {
        let mut host = |_o: u64, _l: u32| Ok(vec![0x12, 0x34]);
        let mut reader = Reader::new(&mut host);
        reader.set_byte_order(ByteOrder::Big);
        assert_eq!(reader.read_u16(0).unwrap(), 0x1234);
        reader.set_byte_order(ByteOrder::Little);
        assert_eq!(reader.read_u16(0).unwrap(), 0x3412);
    }

    #[test]
    fn prefetch_past_eof_is_not_fatal_when_host_clamps() {
        let data = vec![1u8, 2, 3, 4];
        let mut host = |o: u64, l: u32| {
            let start = (o as usize).min(data.len());
            let end = start.saturating_add(l as usize).min(data.len());
            Ok(data[start..end].to_vec())
        };
        let mut reader = Reader::new(&mut host);
        reader.prefetch(0, 4096).unwrap();
        assert_eq!(reader.read(1, 2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn prefetch_past_eof_is_not_fatal_when_host_errors() {
        let mut host = |_o: u64, _l: u32| {
            Err(Error::TruncatedInput {
                offset: 0,
                requested: 4096,
                got: 4,
            })
        };
        let mut reader = Reader::new(&mut host);
        reader.prefetch(0, 4096).unwrap();
    }

    #[test]
    fn read_still_fails_past_a_short_prefetch() {
        let data = vec![1u8, 2, 3, 4];
        let mut host = |o: u64, l: u32| {
            let start = (o as usize).min(data.len());
            let end = start.saturating_add(l as usize).min(data.len());
            Ok(data[start..end].to_vec())
        };
        let mut reader = Reader::new(&mut host);
        reader.prefetch(0, 4096).unwrap();
        let err = reader.read(0, 4096).unwrap_err();
        assert!(matches!(err, Error::TruncatedInput { .. }));
    }
}
