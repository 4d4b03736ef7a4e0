//! HEIF/HEIC still-image parser (ISOBMFF `meta` box, items/properties/references)
//!
//! Reference: ISO/IEC 23008-12. Supports Sony HLG `.HIF` the same way as any
//! other ISOBMFF HEIF container -- the only brand check performed is the
//! `"hei"` major-brand prefix in `ftyp`.

use crate::bmff::{self, read_full_box_header, BoxHeader};
use crate::error::{Error, Result};
use crate::metadata::{ImageMetadata, Rotation, ThumbnailFormat, ThumbnailInfo};
use crate::reader::Reader;
use crate::synth;

use super::ImageReader;

const FTYP_SEARCH_BOUND: u64 = 64 * 1024;
const INITIAL_PREFETCH: u32 = 4096;
const MAX_EXTENTS_PER_ITEM: u32 = 100;

/// A thumbnail candidate resolved from a `thmb` item reference
#[derive(Debug, Clone)]
struct ThumbRef {
    #[allow(dead_code)]
    item_id: u32,
    item_type: [u8; 4],
    offset: u64,
    length: u64,
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<Rotation>,
    /// Raw `hvcC` configuration record body, present only for `hvc1` items
    hvcc: Option<Vec<u8>>,
}

struct HeifState {
    candidates: Vec<ThumbRef>,
    primary_width: u32,
    primary_height: u32,
}

/// Parser for ISOBMFF still-image HEIF/HEIC containers
pub struct HeifParser {
    state: Option<HeifState>,
}

impl HeifParser {
    pub fn new() -> Self {
        Self { state: None }
    }

    fn ensure_parsed(&mut self, reader: &mut Reader<'_>) -> Result<&HeifState> {
        if self.state.is_none() {
            self.state = Some(parse_heif(reader)?);
        }
        Ok(self.state.as_ref().unwrap())
    }
}

impl Default for HeifParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for HeifParser {
    fn list_thumbnails(&mut self, reader: &mut Reader<'_>) -> Result<Vec<ThumbnailInfo>> {
        let state = self.ensure_parsed(reader)?;
        Ok(state
            .candidates
            .iter()
            .map(|c| ThumbnailInfo {
                byte_length: c.length,
                format: thumbnail_format(&c.item_type),
                width: c.width,
                height: c.height,
                rotation: c.rotation,
            })
            .collect())
    }

    fn get_thumbnail(&mut self, reader: &mut Reader<'_>, index: usize) -> Result<Vec<u8>> {
        self.ensure_parsed(reader)?;
        let state = self.state.as_ref().unwrap();
        let candidate = state
            .candidates
            .get(index)
            .ok_or(Error::IndexOutOfBounds {
                index,
                len: state.candidates.len(),
            })?
            .clone();

        let payload = reader.read(candidate.offset, candidate.length as u32)?;

        match &candidate.item_type {
            b"jpeg" => Ok(payload),
            b"hvc1" => {
                let hvcc = candidate.hvcc.clone().ok_or_else(|| {
                    Error::corrupt("hvc1 thumbnail item missing hvcC property".to_string())
                })?;
                let width = candidate
                    .width
                    .ok_or_else(|| Error::corrupt("hvc1 thumbnail item missing ispe property"))?;
                let height = candidate
                    .height
                    .ok_or_else(|| Error::corrupt("hvc1 thumbnail item missing ispe property"))?;
                synth::synthesize_heic(&payload, &hvcc, width, height, candidate.rotation)
            }
            other => Err(Error::UnsupportedItemType(*other)),
        }
    }

    fn metadata(&mut self, reader: &mut Reader<'_>) -> Result<ImageMetadata> {
        let state = self.ensure_parsed(reader)?;
        Ok(ImageMetadata {
            width: state.primary_width,
            height: state.primary_height,
            duration: None,
        })
    }
}

fn thumbnail_format(item_type: &[u8; 4]) -> ThumbnailFormat {
    match item_type {
        b"jpeg" => ThumbnailFormat::Jpeg,
        b"hvc1" => ThumbnailFormat::Heic,
        _ => ThumbnailFormat::Unknown,
    }
}

/// One entry in `ipco`, addressable by 1-based position
struct PropertyBox {
    header: BoxHeader,
}

/// One `ipma` association: (item_id, property_index 1-based, essential)
struct Association {
    item_id: u32,
    property_index: u32,
}

struct ItemLocation {
    offset: u64,
    length: u64,
}

fn parse_heif(reader: &mut Reader<'_>) -> Result<HeifState> {
    reader.prefetch(0, INITIAL_PREFETCH)?;

    let ftyp = bmff::read_box_header(reader, 0, u64::MAX)?;
    if &ftyp.kind != b"ftyp" {
        return Err(Error::NotSupportedFormat("heif"));
    }
    let major_brand = reader.read_fourcc(ftyp.body_offset())?;
    if &major_brand[0..3] != b"hei" {
        return Err(Error::NotSupportedFormat("heif"));
    }

    let meta_header = bmff::find_box(reader, ftyp.offset + ftyp.size, FTYP_SEARCH_BOUND, b"meta")?
        .ok_or(Error::MetadataMissing("meta"))?;

    reader.prefetch(meta_header.offset, meta_header.size as u32)?;

    let (_, _) = read_full_box_header(reader, meta_header.body_offset())?;
    let meta_children_start = meta_header.body_offset() + 4;
    let meta_end = meta_header.offset + meta_header.size;
    let children = bmff::walk_boxes(reader, meta_children_start, meta_end)?;

    let mut primary_item_id: Option<u32> = None;
    let mut item_types: std::collections::HashMap<u32, [u8; 4]> = std::collections::HashMap::new();
    let mut item_locations: std::collections::HashMap<u32, ItemLocation> =
        std::collections::HashMap::new();
    let mut thmb_refs: Vec<(u32, Vec<u32>)> = Vec::new();
    let mut ipco: Vec<PropertyBox> = Vec::new();
    let mut ipma: Vec<Association> = Vec::new();

    for child in &children {
        match &child.kind {
            b"pitm" => primary_item_id = Some(parse_pitm(reader, child)?),
            b"iinf" => item_types = parse_iinf(reader, child)?,
            b"iloc" => item_locations = parse_iloc(reader, child)?,
            b"iref" => thmb_refs = parse_iref(reader, child)?,
            b"iprp" => {
                let (props, assocs) = parse_iprp(reader, child)?;
                ipco = props;
                ipma = assocs;
            }
            _ => {}
        }
    }

    let primary_item_id = primary_item_id.ok_or(Error::MetadataMissing("pitm"))?;

    let mut candidates = Vec::new();
    for (from_id, to_ids) in &thmb_refs {
        if !to_ids.contains(&primary_item_id) {
            continue;
        }
        let item_id = *from_id;
        let item_type = *item_types
            .get(&item_id)
            .ok_or_else(|| Error::corrupt(format!("thmb references unknown item {item_id}")))?;
        let location = item_locations
            .get(&item_id)
            .ok_or_else(|| Error::corrupt(format!("thmb item {item_id} has no iloc entry")))?;

        let mut width = None;
        let mut height = None;
        let mut rotation = None;
        let mut hvcc = None;

        for assoc in ipma.iter().filter(|a| a.item_id == item_id) {
            let idx = assoc.property_index as usize;
            if idx == 0 || idx > ipco.len() {
                continue;
            }
            let prop = &ipco[idx - 1];
            match &prop.header.kind {
                b"ispe" => {
                    let (w, h) = parse_ispe(reader, &prop.header)?;
                    width = Some(w);
                    height = Some(h);
                }
                b"irot" => {
                    let b = reader.read_u8(prop.header.body_offset())?;
                    rotation = Some(Rotation::from_irot_byte(b));
                }
                b"hvcC" => {
                    let body = reader.read(prop.header.body_offset(), prop.header.body_size() as u32)?;
                    hvcc = Some(body);
                }
                _ => {}
            }
        }

        candidates.push(ThumbRef {
            item_id,
            item_type,
            offset: location.offset,
            length: location.length,
            width,
            height,
            rotation,
            hvcc,
        });
    }

    // Primary item's own dimensions (for ImageMetadata), via the same ipma/ipco lookup
    let (primary_width, primary_height) = {
        let mut w = 0;
        let mut h = 0;
        for assoc in ipma.iter().filter(|a| a.item_id == primary_item_id) {
            let idx = assoc.property_index as usize;
            if idx == 0 || idx > ipco.len() {
                continue;
            }
            if &ipco[idx - 1].header.kind == b"ispe" {
                let (pw, ph) = parse_ispe(reader, &ipco[idx - 1].header)?;
                w = pw;
                h = ph;
            }
        }
        (w, h)
    };

    // Stable sort by ascending short side; ties keep discovery order.
    candidates.sort_by_key(|c| match (c.width, c.height) {
        (Some(w), Some(h)) => w.min(h),
        _ => u32::MAX,
    });

    Ok(HeifState {
        candidates,
        primary_width,
        primary_height,
    })
}

fn parse_pitm(reader: &mut Reader<'_>, header: &BoxHeader) -> Result<u32> {
    let (version, _) = read_full_box_header(reader, header.body_offset())?;
    if version == 0 {
        Ok(reader.read_u16_be(header.body_offset() + 4)? as u32)
    } else {
        reader.read_u32_be(header.body_offset() + 4)
    }
}

fn parse_iinf(
    reader: &mut Reader<'_>,
    header: &BoxHeader,
) -> Result<std::collections::HashMap<u32, [u8; 4]>> {
    let (version, _) = read_full_box_header(reader, header.body_offset())?;
    let count_offset = header.body_offset() + 4;
    let (count, entries_start) = if version == 0 {
        (reader.read_u16_be(count_offset)? as u32, count_offset + 2)
    } else {
        (reader.read_u32_be(count_offset)?, count_offset + 4)
    };

    let children = bmff::walk_boxes(reader, entries_start, header.offset + header.size)?;
    if (children.len() as u32) < count {
        tracing::warn!(
            declared = count,
            found = children.len(),
            "iinf entry_count exceeds actual infe children"
        );
    }

    let mut map = std::collections::HashMap::new();
    for child in &children {
        if &child.kind != b"infe" {
            continue;
        }
        let (infe_version, _) = read_full_box_header(reader, child.body_offset())?;
        let (item_id, item_type_offset) = match infe_version {
            2 => (
                reader.read_u16_be(child.body_offset() + 4)? as u32,
                child.body_offset() + 8,
            ),
            3 => (
                reader.read_u32_be(child.body_offset() + 4)?,
                child.body_offset() + 10,
            ),
            _ => continue, // legacy infe versions without a 4CC item_type field
        };
        let item_type = reader.read_fourcc(item_type_offset)?;
        map.insert(item_id, item_type);
    }
    Ok(map)
}

fn parse_iloc(
    reader: &mut Reader<'_>,
    header: &BoxHeader,
) -> Result<std::collections::HashMap<u32, ItemLocation>> {
    let (version, _) = read_full_box_header(reader, header.body_offset())?;
    let sizes_offset = header.body_offset() + 4;
    let size_byte1 = reader.read_u8(sizes_offset)?;
    let size_byte2 = reader.read_u8(sizes_offset + 1)?;
    let offset_size = (size_byte1 >> 4) as u32;
    let length_size = (size_byte1 & 0x0F) as u32;
    let base_offset_size = (size_byte2 >> 4) as u32;
    let index_size = (size_byte2 & 0x0F) as u32;

    for size in [offset_size, length_size, base_offset_size] {
        if size != 0 && size != 4 && size != 8 {
            return Err(Error::corrupt(format!(
                "iloc declares unsupported field width {size} (must be 0, 4, or 8)"
            )));
        }
    }

    let mut cursor = sizes_offset + 2;
    let item_count = if version < 2 {
        let c = reader.read_u16_be(cursor)? as u32;
        cursor += 2;
        c
    } else {
        let c = reader.read_u32_be(cursor)?;
        cursor += 4;
        c
    };

    let mut map = std::collections::HashMap::new();
    for _ in 0..item_count {
        let item_id = if version < 2 {
            let v = reader.read_u16_be(cursor)? as u32;
            cursor += 2;
            v
        } else {
            let v = reader.read_u32_be(cursor)?;
            cursor += 4;
            v
        };

        if version == 1 || version == 2 {
            cursor += 2; // construction_method (12 reserved bits + 4 bits)
        }

        cursor += 2; // data_reference_index

        let base_offset = read_sized(reader, cursor, base_offset_size)?;
        cursor += base_offset_size as u64;

        let extent_count = reader.read_u16_be(cursor)? as u32;
        cursor += 2;

        if extent_count > MAX_EXTENTS_PER_ITEM {
            tracing::warn!(item_id, extent_count, "item has implausible extent count, skipping");
            // Still need to advance the cursor correctly to parse subsequent
            // items; since we don't know per-extent widths without summing,
            // and this is already corruption, stop here.
            return Err(Error::corrupt(format!(
                "item {item_id} declares {extent_count} extents (max {MAX_EXTENTS_PER_ITEM})"
            )));
        }

        let mut first_extent: Option<(u64, u64)> = None;
        for _ in 0..extent_count {
            if (version == 1 || version == 2) && index_size > 0 {
                cursor += index_size as u64;
            }
            let extent_offset = read_sized(reader, cursor, offset_size)?;
            cursor += offset_size as u64;
            let extent_length = read_sized(reader, cursor, length_size)?;
            cursor += length_size as u64;

            if first_extent.is_none() {
                first_extent = Some((base_offset + extent_offset, extent_length));
            }
        }

        if let Some((offset, length)) = first_extent {
            map.insert(item_id, ItemLocation { offset, length });
        }
    }

    Ok(map)
}

fn read_sized(reader: &mut Reader<'_>, offset: u64, size: u32) -> Result<u64> {
    match size {
        0 => Ok(0),
        4 => Ok(reader.read_u32_be(offset)? as u64),
        8 => reader.read_u64_be(offset),
        _ => unreachable!("validated to be 0, 4, or 8"),
    }
}

fn parse_iref(reader: &mut Reader<'_>, header: &BoxHeader) -> Result<Vec<(u32, Vec<u32>)>> {
    let (version, _) = read_full_box_header(reader, header.body_offset())?;
    let id_size: u64 = if version == 0 { 2 } else { 4 };
    let body_start = header.body_offset() + 4;
    let body_end = header.offset + header.size;

    let refs = bmff::walk_boxes(reader, body_start, body_end)?;
    let mut thmb = Vec::new();
    for r in &refs {
        if &r.kind != b"thmb" {
            continue;
        }
        let mut cursor = r.body_offset();
        let from_id = read_id(reader, cursor, id_size)?;
        cursor += id_size;
        let ref_count = reader.read_u16_be(cursor)? as u64;
        cursor += 2;
        let mut to_ids = Vec::with_capacity(ref_count as usize);
        for _ in 0..ref_count {
            to_ids.push(read_id(reader, cursor, id_size)?);
            cursor += id_size;
        }
        thmb.push((from_id, to_ids));
    }
    Ok(thmb)
}

fn read_id(reader: &mut Reader<'_>, offset: u64, size: u64) -> Result<u32> {
    if size == 2 {
        Ok(reader.read_u16_be(offset)? as u32)
    } else {
        reader.read_u32_be(offset)
    }
}

fn parse_iprp(
    reader: &mut Reader<'_>,
    header: &BoxHeader,
) -> Result<(Vec<PropertyBox>, Vec<Association>)> {
    let body_start = header.body_offset();
    let body_end = header.offset + header.size;
    let children = bmff::walk_boxes(reader, body_start, body_end)?;

    let mut props = Vec::new();
    let mut assocs = Vec::new();

    for child in &children {
        if &child.kind == b"ipco" {
            let entries = bmff::walk_boxes(reader, child.body_offset(), child.offset + child.size)?;
            props = entries.into_iter().map(|header| PropertyBox { header }).collect();
        } else if &child.kind == b"ipma" {
            assocs = parse_ipma(reader, child)?;
        }
    }

    Ok((props, assocs))
}

fn parse_ipma(reader: &mut Reader<'_>, header: &BoxHeader) -> Result<Vec<Association>> {
    let (version, flags) = read_full_box_header(reader, header.body_offset())?;
    let wide_index = flags & 0x1 != 0;
    let mut cursor = header.body_offset() + 4;
    let entry_count = reader.read_u32_be(cursor)?;
    cursor += 4;

    let mut out = Vec::new();
    for _ in 0..entry_count {
        let item_id = if version < 1 {
            let v = reader.read_u16_be(cursor)? as u32;
            cursor += 2;
            v
        } else {
            let v = reader.read_u32_be(cursor)?;
            cursor += 4;
            v
        };

        let assoc_count = reader.read_u8(cursor)?;
        cursor += 1;

        for _ in 0..assoc_count {
            let property_index = if wide_index {
                let raw = reader.read_u16_be(cursor)?;
                cursor += 2;
                (raw & 0x7FFF) as u32
            } else {
                let raw = reader.read_u8(cursor)?;
                cursor += 1;
                (raw & 0x7F) as u32
            };
            out.push(Association {
                item_id,
                property_index,
            });
        }
    }

    Ok(out)
}

fn parse_ispe(reader: &mut Reader<'_>, header: &BoxHeader) -> Result<(u32, u32)> {
    let body = header.body_offset() + 4; // skip FullBox version/flags
    let width = reader.read_u32_be(body)?;
    let height = reader.read_u32_be(body + 4)?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemoryHostReader;
    use crate::test_support::build_heic;

    #[test]
    fn list_thumbnails_finds_thmb_linked_item() {
        let data = build_heic(320, 240, b"jpeg", vec![0xFF, 0xD8, 0xFF, 0xD9], None);
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = HeifParser::new();
        let thumbs = parser.list_thumbnails(&mut reader).unwrap();
        assert_eq!(thumbs.len(), 1);
        assert_eq!(thumbs[0].width, Some(320));
        assert_eq!(thumbs[0].height, Some(240));
        assert_eq!(thumbs[0].format, ThumbnailFormat::Jpeg);
    }

    #[test]
    fn get_thumbnail_returns_raw_jpeg_bytes() {
        let jpeg_bytes = vec![0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9];
        let data = build_heic(100, 80, b"jpeg", jpeg_bytes.clone(), None);
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = HeifParser::new();
        parser.list_thumbnails(&mut reader).unwrap();
        let payload = parser.get_thumbnail(&mut reader, 0).unwrap();
        assert_eq!(payload, jpeg_bytes);
    }

    #[test]
    fn rejects_non_heif_ftyp() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&16u32.to_be_bytes());
        buf.extend_from_slice(b"ftyp");
        buf.extend_from_slice(b"mp42\0\0\0\0");
        let mut host = MemoryHostReader::new(&buf);
        let mut reader = Reader::new(&mut host);
        let mut parser = HeifParser::new();
        let err = parser.list_thumbnails(&mut reader).unwrap_err();
        assert!(matches!(err, Error::NotSupportedFormat("heif")));
    }

    #[test]
    fn out_of_bounds_index_is_reported() {
        let data = build_heic(320, 240, b"jpeg", vec![0xFF, 0xD8, 0xFF, 0xD9], None);
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = HeifParser::new();
        parser.list_thumbnails(&mut reader).unwrap();
        let err = parser.get_thumbnail(&mut reader, 5).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds { .. }));
    }
}
