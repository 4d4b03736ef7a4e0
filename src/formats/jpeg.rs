//! JPEG thumbnail parser
//!
//! Walks JPEG marker segments up to Start-of-Scan, extracting the primary
//! image's dimensions (first SOF segment) and any embedded thumbnails:
//! the legacy EXIF IFD1 thumbnail (APP1, `"Exif\0\0"`) and the CIPA DC-007
//! Multi-Picture Format entries (APP2, `"MPF\0"`/`"MPF "`). Reference: JPEG
//! ITU-T T.81 Annex B (markers), EXIF 2.3 §4.6.4 (IFD1), CIPA DC-007 (MPF).

use crate::error::{Error, Result};
use crate::metadata::{ImageMetadata, ThumbnailFormat, ThumbnailInfo};
use crate::reader::{ByteOrder, Reader};
use crate::tiff;

use super::ImageReader;

const MAX_SEGMENTS: u32 = 4096;

/// Location of a candidate discovered while walking markers
#[derive(Debug, Clone, Copy)]
struct Candidate {
    offset: u64,
    length: u64,
    width: Option<u32>,
    height: Option<u32>,
}

struct JpegState {
    width: u32,
    height: u32,
    candidates: Vec<Candidate>,
}

pub struct JpegParser {
    state: Option<JpegState>,
}

impl JpegParser {
    pub fn new() -> Self {
        Self { state: None }
    }

    fn ensure_parsed(&mut self, reader: &mut Reader<'_>) -> Result<&JpegState> {
        if self.state.is_none() {
            self.state = Some(parse_jpeg(reader)?);
        }
        Ok(self.state.as_ref().unwrap())
    }
}

impl Default for JpegParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for JpegParser {
    fn list_thumbnails(&mut self, reader: &mut Reader<'_>) -> Result<Vec<ThumbnailInfo>> {
        let state = self.ensure_parsed(reader)?;
        Ok(state
            .candidates
            .iter()
            .map(|c| ThumbnailInfo {
                byte_length: c.length,
                format: ThumbnailFormat::Jpeg,
                width: c.width,
                height: c.height,
                rotation: None,
            })
            .collect())
    }

    fn get_thumbnail(&mut self, reader: &mut Reader<'_>, index: usize) -> Result<Vec<u8>> {
        self.ensure_parsed(reader)?;
        let state = self.state.as_ref().unwrap();
        let candidate = *state
            .candidates
            .get(index)
            .ok_or(Error::IndexOutOfBounds {
                index,
                len: state.candidates.len(),
            })?;
        reader.read(candidate.offset, candidate.length as u32)
    }

    fn metadata(&mut self, reader: &mut Reader<'_>) -> Result<ImageMetadata> {
        let state = self.ensure_parsed(reader)?;
        Ok(ImageMetadata {
            width: state.width,
            height: state.height,
            duration: None,
        })
    }
}

fn is_sof_marker(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC
}

fn parse_jpeg(reader: &mut Reader<'_>) -> Result<JpegState> {
    if reader.read_u16_be(0)? != 0xFFD8 {
        return Err(Error::NotSupportedFormat("jpeg"));
    }

    let mut offset = 2u64;
    let mut width = None;
    let mut height = None;
    let mut candidates = Vec::new();

    for _ in 0..MAX_SEGMENTS {
        if reader.read_u8(offset)? != 0xFF {
            return Err(Error::corrupt(format!("expected marker prefix at {offset}")));
        }
        offset += 1;

        let marker = loop {
            let b = reader.read_u8(offset)?;
            offset += 1;
            if b != 0xFF {
                break b;
            }
        };

        if marker == 0xD9 {
            break; // EOI
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue; // TEM / restart markers carry no length or payload
        }

        let seg_len = reader.read_u16_be(offset)? as u64;
        if seg_len < 2 {
            return Err(Error::corrupt(format!("segment at {offset} has length {seg_len} < 2")));
        }
        let payload_offset = offset + 2;

        if is_sof_marker(marker) && width.is_none() {
            height = Some(reader.read_u16_be(payload_offset + 1)? as u32);
            width = Some(reader.read_u16_be(payload_offset + 3)? as u32);
        } else if marker == 0xE1 {
            if let Some(c) = try_parse_exif_thumbnail(reader, payload_offset)? {
                candidates.push(c);
            }
        } else if marker == 0xE2 {
            candidates.extend(try_parse_mpf_thumbnails(reader, payload_offset)?);
        }

        offset += seg_len;

        if marker == 0xDA {
            break; // Start of Scan: entropy-coded data follows, nothing more to read
        }
    }

    let width = width.ok_or(Error::MetadataMissing("SOF"))?;
    let height = height.ok_or(Error::MetadataMissing("SOF"))?;

    Ok(JpegState {
        width,
        height,
        candidates,
    })
}

fn try_parse_exif_thumbnail(reader: &mut Reader<'_>, payload_offset: u64) -> Result<Option<Candidate>> {
    let signature = reader.read(payload_offset, 6)?;
    if signature != b"Exif\0\0" {
        return Ok(None);
    }

    let base = payload_offset + 6;
    let (order, ifd0_offset) = tiff::parse_header(reader, base)?;
    let (_, next_offset) = tiff::parse_ifd(reader, base, ifd0_offset, order)?;
    if next_offset == 0 {
        return Ok(None); // no IFD1, so no legacy thumbnail
    }

    let (ifd1, _) = tiff::parse_ifd(reader, base, next_offset, order)?;
    let Some(offset_entry) = tiff::find_entry(&ifd1, 0x0201) else {
        return Ok(None);
    };
    let Some(length_entry) = tiff::find_entry(&ifd1, 0x0202) else {
        return Ok(None);
    };

    let offset = base + offset_entry.widened_value() as u64;
    let length = length_entry.widened_value() as u64;
    let width = tiff::find_entry(&ifd1, 0x0100).map(|e| e.widened_value());
    let height = tiff::find_entry(&ifd1, 0x0101).map(|e| e.widened_value());

    Ok(Some(Candidate {
        offset,
        length,
        width,
        height,
    }))
}

fn try_parse_mpf_thumbnails(reader: &mut Reader<'_>, payload_offset: u64) -> Result<Vec<Candidate>> {
    let signature = reader.read(payload_offset, 4)?;
    if signature != *b"MPF\0" && signature != *b"MPF " {
        return Ok(Vec::new());
    }

    let base = payload_offset + 4;
    let (order, ifd0_offset) = tiff::parse_header(reader, base)?;
    let (entries, _) = tiff::parse_ifd(reader, base, ifd0_offset, order)?;

    let Some(mp_entry) = tiff::find_entry(&entries, 0xB002) else {
        return Ok(Vec::new());
    };
    let num_images = tiff::find_entry(&entries, 0xB001)
        .map(|e| e.widened_value())
        .unwrap_or(0);
    if num_images == 0 {
        return Ok(Vec::new());
    }

    // The table is `num_images` 16-byte records; never trust the declared
    // `count` beyond that, however implausible the 0xB002 entry claims to be.
    let record_bytes_total = (num_images as u32)
        .saturating_mul(16)
        .min(mp_entry.count);
    let data_offset = base + mp_entry.value_offset as u64;
    let raw = reader.read(data_offset, record_bytes_total)?;

    let read_u32 = |bytes: &[u8]| -> u32 {
        match order {
            ByteOrder::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            ByteOrder::Little => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    };

    let mut out = Vec::new();
    // Index 0 is the primary (baseline) image itself, never a thumbnail candidate.
    for i in 1..num_images as usize {
        let rec_start = i * 16;
        let Some(rec) = raw.get(rec_start..rec_start + 16) else {
            break;
        };
        let size = read_u32(&rec[4..8]);
        let entry_offset = read_u32(&rec[8..12]);
        if size == 0 {
            continue;
        }
        out.push(Candidate {
            offset: base + entry_offset as u64,
            length: size as u64,
            width: None,
            height: None,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemoryHostReader;
    use crate::test_support::build_jpeg_with_exif_thumbnail;

    #[test]
    fn parses_dimensions_from_sof0() {
        let data = build_jpeg_with_exif_thumbnail(800, 600, None);
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = JpegParser::new();
        let meta = parser.metadata(&mut reader).unwrap();
        assert_eq!(meta.width, 800);
        assert_eq!(meta.height, 600);
    }

    #[test]
    fn finds_exif_ifd1_thumbnail() {
        let thumb_bytes = vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9];
        let data = build_jpeg_with_exif_thumbnail(800, 600, Some(thumb_bytes.clone()));
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = JpegParser::new();
        let thumbs = parser.list_thumbnails(&mut reader).unwrap();
        assert_eq!(thumbs.len(), 1);
        assert_eq!(thumbs[0].byte_length, thumb_bytes.len() as u64);
        let payload = parser.get_thumbnail(&mut reader, 0).unwrap();
        assert_eq!(payload, thumb_bytes);
    }

    #[test]
    fn rejects_non_jpeg_input() {
        let data = vec![0x00, 0x01, 0x02, 0x03];
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = JpegParser::new();
        let err = parser.metadata(&mut reader).unwrap_err();
        assert!(matches!(err, Error::NotSupportedFormat("jpeg")));
    }

    #[test]
    fn no_exif_app1_yields_no_candidates() {
        let data = build_jpeg_with_exif_thumbnail(640, 480, None);
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = JpegParser::new();
        let thumbs = parser.list_thumbnails(&mut reader).unwrap();
        assert!(thumbs.is_empty());
    }

    /// Builds a minimal APP2 MPF payload (no surrounding JPEG) with the MP
    /// entry table encoded in `order`, so the decode-side byte-order
    /// handling can be checked independently of the rest of the MPF layout.
    fn mpf_payload_with_order(order: ByteOrder, size: u32, data_offset: u32) -> Vec<u8> {
        let (bom, put16, put32): (&[u8; 2], fn(u16) -> Vec<u8>, fn(u32) -> Vec<u8>) = match order {
            ByteOrder::Little => (b"II", |v| v.to_le_bytes().to_vec(), |v| v.to_le_bytes().to_vec()),
            ByteOrder::Big => (b"MM", |v| v.to_be_bytes().to_vec(), |v| v.to_be_bytes().to_vec()),
        };

        let mut tiff = Vec::new();
        tiff.extend_from_slice(bom);
        tiff.extend_from_slice(&put16(42));
        tiff.extend_from_slice(&put32(8)); // IFD0 at offset 8
        tiff.extend_from_slice(&put16(3)); // 3 entries
        let mut entry = |tag: u16, field_type: u16, count: u32, value: u32| {
            tiff.extend_from_slice(&put16(tag));
            tiff.extend_from_slice(&put16(field_type));
            tiff.extend_from_slice(&put32(count));
            tiff.extend_from_slice(&put32(value));
        };
        entry(0xB000, 7, 4, 0x00300100);
        entry(0xB001, 4, 1, 2); // 2 images
        let mp_entry_table_rel = 8 + 2 + 3 * 12 + 4;
        entry(0xB002, 7, 32, mp_entry_table_rel as u32);
        tiff.extend_from_slice(&put32(0)); // next IFD

        let primary_rec = vec![0u8; 16]; // data_offset == 0 => primary, excluded
        tiff.extend_from_slice(&primary_rec);

        let mut preview_rec = vec![0u8; 16];
        preview_rec[4..8].copy_from_slice(&put32(size));
        preview_rec[8..12].copy_from_slice(&put32(data_offset));
        tiff.extend_from_slice(&preview_rec);

        let mut body = Vec::new();
        body.extend_from_slice(b"MPF\0");
        body.extend_from_slice(&tiff);
        body
    }

    #[test]
    fn mpf_entry_table_respects_little_endian_byte_order() {
        let payload = mpf_payload_with_order(ByteOrder::Little, 123, 0x10);
        let mut host = MemoryHostReader::new(&payload);
        let mut reader = Reader::new(&mut host);
        let candidates = try_parse_mpf_thumbnails(&mut reader, 0).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].length, 123);
        assert_eq!(candidates[0].offset, 4 /* base = payload_offset + 4 */ + 0x10);
    }

    #[test]
    fn mpf_entry_table_respects_big_endian_byte_order() {
        let payload = mpf_payload_with_order(ByteOrder::Big, 456, 0x20);
        let mut host = MemoryHostReader::new(&payload);
        let mut reader = Reader::new(&mut host);
        let candidates = try_parse_mpf_thumbnails(&mut reader, 0).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].length, 456);
        assert_eq!(candidates[0].offset, 4 + 0x20);
    }
}
