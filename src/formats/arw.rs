//! Sony ARW (raw) thumbnail/preview parser
//!
//! An ARW file is a TIFF variant: IFD0 carries the camera's Exif-style tags
//! plus an orientation tag, and the IFD chain commonly holds one or two
//! additional directories describing embedded JPEG previews/thumbnails
//! (`JPEGInterchangeFormat`/`Length`, or occasionally a single-strip
//! `StripOffsets`/`StripByteCounts` pair). Reference: TIFF 6.0, Sony's ARW
//! tag usage as documented by Exiftool's Sony tag tables.

use crate::error::{Error, Result};
use crate::metadata::{ImageMetadata, Rotation, ThumbnailFormat, ThumbnailInfo};
use crate::reader::Reader;
use crate::tiff::{self, IfdEntry};

use super::ImageReader;

const MAX_IFDS: u32 = 10;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    offset: u64,
    length: u64,
    width: Option<u32>,
    height: Option<u32>,
}

struct ArwState {
    width: u32,
    height: u32,
    rotation: Option<Rotation>,
    candidates: Vec<Candidate>,
}

pub struct SonyArwParser {
    state: Option<ArwState>,
}

impl SonyArwParser {
    pub fn new() -> Self {
        Self { state: None }
    }

    fn ensure_parsed(&mut self, reader: &mut Reader<'_>) -> Result<&ArwState> {
        if self.state.is_none() {
            self.state = Some(parse_arw(reader)?);
        }
        Ok(self.state.as_ref().unwrap())
    }
}

impl Default for SonyArwParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for SonyArwParser {
    fn list_thumbnails(&mut self, reader: &mut Reader<'_>) -> Result<Vec<ThumbnailInfo>> {
        let state = self.ensure_parsed(reader)?;
        let rotation = state.rotation;
        Ok(state
            .candidates
            .iter()
            .map(|c| ThumbnailInfo {
                byte_length: c.length,
                format: ThumbnailFormat::Jpeg,
                width: c.width,
                height: c.height,
                rotation,
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

fn orientation_to_rotation(value: u32) -> Option<Rotation> {
    match value {
        1 => Some(Rotation::from_degrees_ccw(0)),
        3 => Some(Rotation::from_degrees_ccw(180)),
        6 => Some(Rotation::from_degrees_ccw(90)),
        8 => Some(Rotation::from_degrees_ccw(270)),
        _ => None,
    }
}

fn dimensions_from(entries: &[IfdEntry]) -> (Option<u32>, Option<u32>) {
    let width = tiff::find_entry(entries, 0x0100).map(|e| e.widened_value());
    let height = tiff::find_entry(entries, 0x0101).map(|e| e.widened_value());
    (width, height)
}

fn candidate_from(entries: &[IfdEntry], base: u64) -> Option<Candidate> {
    let (offset_tag, length_tag) = if tiff::find_entry(entries, 0x0201).is_some() {
        (0x0201, 0x0202)
    } else if tiff::find_entry(entries, 0x0111).is_some() {
        (0x0111, 0x0117)
    } else {
        return None;
    };

    let offset_entry = tiff::find_entry(entries, offset_tag)?;
    let length_entry = tiff::find_entry(entries, length_tag)?;
    let (width, height) = dimensions_from(entries);

    Some(Candidate {
        offset: base + offset_entry.widened_value() as u64,
        length: length_entry.widened_value() as u64,
        width,
        height,
    })
}

fn parse_arw(reader: &mut Reader<'_>) -> Result<ArwState> {
    let (order, ifd0_offset) = tiff::parse_header(reader, 0)?;

    let mut rotation = None;
    let mut primary_width = None;
    let mut primary_height = None;
    let mut candidates = Vec::new();

    let mut offset = ifd0_offset;
    for i in 0..MAX_IFDS {
        if offset == 0 {
            break;
        }
        let (entries, next_offset) = tiff::parse_ifd(reader, 0, offset, order)?;

        if i == 0 {
            rotation = tiff::find_entry(&entries, 0x0112)
                .and_then(|e| orientation_to_rotation(e.widened_value()));

            let (w, h) = dimensions_from(&entries);
            primary_width = w;
            primary_height = h;
            if primary_width.is_none() || primary_height.is_none() {
                if let Some((sw, sh)) = sub_ifd_dimensions(reader, &entries, order)? {
                    primary_width = primary_width.or(Some(sw));
                    primary_height = primary_height.or(Some(sh));
                }
            }
        }

        if let Some(c) = candidate_from(&entries, 0) {
            candidates.push(c);
        }

        offset = next_offset;
    }

    let width = primary_width.ok_or(Error::MetadataMissing("ImageWidth"))?;
    let height = primary_height.ok_or(Error::MetadataMissing("ImageLength"))?;

    Ok(ArwState {
        width,
        height,
        rotation,
        candidates,
    })
}

/// Recurse exactly one level into a `SubIFD` (tag 0x014A) for dimensions,
/// when IFD0 itself doesn't carry ImageWidth/ImageLength.
fn sub_ifd_dimensions(
    reader: &mut Reader<'_>,
    entries: &[IfdEntry],
    order: crate::reader::ByteOrder,
) -> Result<Option<(u32, u32)>> {
    let Some(sub_ifd_entry) = tiff::find_entry(entries, 0x014A) else {
        return Ok(None);
    };
    let sub_offset = sub_ifd_entry.widened_value();
    let (sub_entries, _) = tiff::parse_ifd(reader, 0, sub_offset, order)?;
    let (w, h) = dimensions_from(&sub_entries);
    Ok(w.zip(h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemoryHostReader;
    use crate::test_support::build_arw;

    #[test]
    fn reads_primary_dimensions_and_orientation() {
        let data = build_arw(6000, 4000, 6, Some(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = SonyArwParser::new();
        let meta = parser.metadata(&mut reader).unwrap();
        assert_eq!(meta.width, 6000);
        assert_eq!(meta.height, 4000);
    }

    #[test]
    fn orientation_six_maps_to_90_degrees_ccw() {
        let data = build_arw(6000, 4000, 6, Some(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = SonyArwParser::new();
        let thumbs = parser.list_thumbnails(&mut reader).unwrap();
        assert_eq!(thumbs[0].rotation.unwrap().degrees(), 90);
    }

    #[test]
    fn finds_jpeg_preview_in_second_ifd() {
        let preview = vec![0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9];
        let data = build_arw(6000, 4000, 1, Some(preview.clone()));
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = SonyArwParser::new();
        let thumbs = parser.list_thumbnails(&mut reader).unwrap();
        assert_eq!(thumbs.len(), 1);
        let payload = parser.get_thumbnail(&mut reader, 0).unwrap();
        assert_eq!(payload, preview);
    }
}
