//! TIFF IFD walker
//!
//! Reusable primitive shared by the JPEG/EXIF, MPF, and Sony ARW parsers: a
//! TIFF-style Image File Directory is a tag count, followed by that many
//! 12-byte entries (`tag: u16, type: u16, count: u32, value/offset: u32`),
//! followed by a 4-byte next-IFD offset. Reference: TIFF 6.0 §2.

use crate::error::Result;
use crate::reader::{ByteOrder, Reader};

/// TIFF field type codes (TIFF 6.0 table 2)
pub mod field_type {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
}

/// A single parsed IFD entry
#[derive(Debug, Clone, Copy)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    /// The 4-byte value/offset field, already widened to a native u32 using
    /// the IFD's byte order. Callers pick `value_u16`/`value_u32` based on
    /// `field_type` to interpret it correctly.
    pub value_offset: u32,
    order: ByteOrder,
}

impl IfdEntry {
    /// Interpret the inline value as a u16 (valid for SHORT-typed fields)
    ///
    /// A SHORT value occupies the first two bytes of the four-byte field in
    /// file order; since `value_offset` was already decoded to a u32 using
    /// the IFD's byte order, those two bytes land in the high half for
    /// big-endian files and the low half for little-endian files.
    pub fn value_u16(&self) -> u16 {
        match self.order {
            ByteOrder::Big => (self.value_offset >> 16) as u16,
            ByteOrder::Little => self.value_offset as u16,
        }
    }

    /// Interpret the inline value as a u32 (valid for LONG-typed fields, or
    /// as a direct offset regardless of type)
    pub fn value_u32(&self) -> u32 {
        self.value_offset
    }

    /// Widen to u32 the way §4.4 requires for tag value fields: SHORT values
    /// widen via `value_u16`, everything else is read as-is.
    pub fn widened_value(&self) -> u32 {
        if self.field_type == field_type::SHORT {
            self.value_u16() as u32
        } else {
            self.value_offset
        }
    }
}

/// Parse an 8-byte TIFF header, returning `(byte_order, ifd0_offset)`
///
/// `base` is the absolute file offset the header starts at; `ifd0_offset` is
/// returned relative to `base`, matching TIFF's own offset convention.
pub fn parse_header(reader: &mut Reader<'_>, base: u64) -> Result<(ByteOrder, u32)> {
    let bom = reader.read_fourcc(base)?;
    let order = match &bom[0..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return Err(crate::error::Error::NotSupportedFormat("tiff")),
    };
    reader.set_byte_order(order);

    let magic = reader.read_u16(base + 2)?;
    if magic != 42 {
        return Err(crate::error::Error::NotSupportedFormat("tiff"));
    }

    let ifd0_offset = reader.read_u32(base + 4)?;
    Ok((order, ifd0_offset))
}

/// Maximum tags accepted in a single IFD (defensive bound against corrupt counts)
const MAX_IFD_ENTRIES: u16 = 4096;

/// Parse the IFD at `base + offset`, returning its entries and the
/// `base`-relative offset of the next IFD (0 if none)
pub fn parse_ifd(
    reader: &mut Reader<'_>,
    base: u64,
    offset: u32,
    order: ByteOrder,
) -> Result<(Vec<IfdEntry>, u32)> {
    let ifd_start = base + offset as u64;
    let count = reader.read_u16(ifd_start)?;
    if count > MAX_IFD_ENTRIES {
        return Err(crate::error::Error::corrupt(format!(
            "IFD at {ifd_start} declares {count} entries (max {MAX_IFD_ENTRIES})"
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count as u64 {
        let entry_offset = ifd_start + 2 + i * 12;
        let tag = reader.read_u16(entry_offset)?;
        let field_type = reader.read_u16(entry_offset + 2)?;
        let entry_count = reader.read_u32(entry_offset + 4)?;
        let value_offset = reader.read_u32(entry_offset + 8)?;
        entries.push(IfdEntry {
            tag,
            field_type,
            count: entry_count,
            value_offset,
            order,
        });
    }

    let next_ifd_pos = ifd_start + 2 + count as u64 * 12;
    let next_offset = reader.read_u32(next_ifd_pos)?;
    Ok((entries, next_offset))
}

/// Find the first entry matching `tag`
pub fn find_entry(entries: &[IfdEntry], tag: u16) -> Option<&IfdEntry> {
    entries.iter().find(|e| e.tag == tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemoryHostReader;

    fn little_endian_tiff_with_one_ifd() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"II");
        buf.extend_from_slice(&42u16.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes()); // IFD0 at offset 8
                                                     // IFD0: 1 entry
        buf.extend_from_slice(&1u16.to_le_bytes());
        // tag 0x0100 (ImageWidth), type LONG, count 1, value 640
        buf.extend_from_slice(&0x0100u16.to_le_bytes());
        buf.extend_from_slice(&field_type::LONG.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&640u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // next IFD = 0
        buf
    }

    #[test]
    fn parses_header_and_single_entry_ifd() {
        let data = little_endian_tiff_with_one_ifd();
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let (order, ifd0) = parse_header(&mut reader, 0).unwrap();
        assert_eq!(order, ByteOrder::Little);
        assert_eq!(ifd0, 8);

        let (entries, next) = parse_ifd(&mut reader, 0, ifd0, order).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(next, 0);
        let e = find_entry(&entries, 0x0100).unwrap();
        assert_eq!(e.value_u32(), 640);
    }

    #[test]
    fn short_value_widens_correctly_in_both_byte_orders() {
        let data = little_endian_tiff_with_one_ifd();
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        reader.set_byte_order(ByteOrder::Little);
        let (entries, _) = parse_ifd(&mut reader, 0, 8, ByteOrder::Little).unwrap();
        assert_eq!(entries[0].widened_value(), 640);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"II");
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());
        let mut host = MemoryHostReader::new(&buf);
        let mut reader = Reader::new(&mut host);
        assert!(parse_header(&mut reader, 0).is_err());
    }
}
