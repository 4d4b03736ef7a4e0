//! MP4/ISOBMFF video thumbnail parser
//!
//! Locates the first video track (`moov/trak` whose `mdia/hdlr` handler type
//! is `"vide"`) for dimensions, rotation, and duration; surfaces embedded
//! cover art (`moov/udta/meta/ilst`, `covr`/`snal`/`tnal`) as candidates; and
//! falls back to the track's first coded sample (re-wrapped as a minimal
//! HEIC) when no cover art is present. Reference: ISO/IEC 14496-12/-14.

use crate::bmff::{self, read_full_box_header, BoxHeader};
use crate::error::{Error, Result};
use crate::metadata::{ImageMetadata, Rotation, ThumbnailFormat, ThumbnailInfo};
use crate::reader::Reader;
use crate::synth;

use super::ImageReader;

#[derive(Debug, Clone)]
enum Payload {
    Raw,
    SynthesizeHeic { hvcc: Vec<u8> },
}

#[derive(Debug, Clone)]
struct Candidate {
    offset: u64,
    length: u64,
    width: Option<u32>,
    height: Option<u32>,
    format: ThumbnailFormat,
    payload: Payload,
}

struct Mp4State {
    width: u32,
    height: u32,
    rotation: Rotation,
    duration: Option<f64>,
    candidates: Vec<Candidate>,
}

pub struct Mp4Parser {
    state: Option<Mp4State>,
}

impl Mp4Parser {
    pub fn new() -> Self {
        Self { state: None }
    }

    fn ensure_parsed(&mut self, reader: &mut Reader<'_>) -> Result<&Mp4State> {
        if self.state.is_none() {
            self.state = Some(parse_mp4(reader)?);
        }
        Ok(self.state.as_ref().unwrap())
    }
}

impl Default for Mp4Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for Mp4Parser {
    fn list_thumbnails(&mut self, reader: &mut Reader<'_>) -> Result<Vec<ThumbnailInfo>> {
        let state = self.ensure_parsed(reader)?;
        let rotation = state.rotation;
        Ok(state
            .candidates
            .iter()
            .map(|c| ThumbnailInfo {
                byte_length: c.length,
                format: c.format,
                width: c.width,
                height: c.height,
                rotation: Some(rotation),
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

        let raw = reader.read(candidate.offset, candidate.length as u32)?;
        match &candidate.payload {
            Payload::Raw => Ok(raw),
            Payload::SynthesizeHeic { hvcc } => {
                let width = candidate
                    .width
                    .ok_or_else(|| Error::corrupt("first-frame candidate missing width"))?;
                let height = candidate
                    .height
                    .ok_or_else(|| Error::corrupt("first-frame candidate missing height"))?;
                synth::synthesize_heic(&raw, hvcc, width, height, Some(state.rotation))
            }
        }
    }

    fn metadata(&mut self, reader: &mut Reader<'_>) -> Result<ImageMetadata> {
        let state = self.ensure_parsed(reader)?;
        Ok(ImageMetadata {
            width: state.width,
            height: state.height,
            duration: state.duration,
        })
    }
}

fn parse_mp4(reader: &mut Reader<'_>) -> Result<Mp4State> {
    let moov = bmff::find_box(reader, 0, u64::MAX, b"moov")?.ok_or(Error::MetadataMissing("moov"))?;
    let moov_end = moov.offset + moov.size;

    let duration = parse_mvhd_duration(reader, &moov, moov_end)?;

    let video_trak = find_video_trak(reader, &moov, moov_end)?.ok_or(Error::MetadataMissing("trak"))?;
    let trak_end = video_trak.offset + video_trak.size;

    let (width, height, rotation) = parse_tkhd(reader, &video_trak, trak_end)?;

    let mut candidates = parse_cover_art(reader, &moov, moov_end)?;
    if candidates.is_empty() {
        if let Some(c) = parse_first_frame(reader, &video_trak, trak_end, width, height)? {
            candidates.push(c);
        }
    }

    Ok(Mp4State {
        width,
        height,
        rotation,
        duration,
        candidates,
    })
}

fn parse_mvhd_duration(reader: &mut Reader<'_>, moov: &BoxHeader, moov_end: u64) -> Result<Option<f64>> {
    let Some(mvhd) = bmff::find_box(reader, moov.body_offset(), moov_end, b"mvhd")? else {
        return Ok(None);
    };
    let (version, _) = read_full_box_header(reader, mvhd.body_offset())?;
    let (timescale, duration) = if version == 0 {
        let timescale = reader.read_u32_be(mvhd.body_offset() + 12)?;
        let duration = reader.read_u32_be(mvhd.body_offset() + 16)? as u64;
        (timescale, duration)
    } else {
        let timescale = reader.read_u32_be(mvhd.body_offset() + 20)?;
        let duration = reader.read_u64_be(mvhd.body_offset() + 24)?;
        (timescale, duration)
    };
    if timescale == 0 {
        return Ok(None);
    }
    Ok(Some(duration as f64 / timescale as f64))
}

fn find_video_trak(reader: &mut Reader<'_>, moov: &BoxHeader, moov_end: u64) -> Result<Option<BoxHeader>> {
    let children = bmff::walk_boxes(reader, moov.body_offset(), moov_end)?;
    for trak in children.into_iter().filter(|b| &b.kind == b"trak") {
        let trak_end = trak.offset + trak.size;
        let Some(mdia) = bmff::find_box(reader, trak.body_offset(), trak_end, b"mdia")? else {
            continue;
        };
        let mdia_end = mdia.offset + mdia.size;
        let Some(hdlr) = bmff::find_box(reader, mdia.body_offset(), mdia_end, b"hdlr")? else {
            continue;
        };
        let handler_type = reader.read_fourcc(hdlr.body_offset() + 8)?;
        if &handler_type == b"vide" {
            return Ok(Some(trak));
        }
    }
    Ok(None)
}

fn parse_tkhd(reader: &mut Reader<'_>, trak: &BoxHeader, trak_end: u64) -> Result<(u32, u32, Rotation)> {
    let tkhd = bmff::find_box(reader, trak.body_offset(), trak_end, b"tkhd")?
        .ok_or(Error::MetadataMissing("tkhd"))?;
    let (version, _) = read_full_box_header(reader, tkhd.body_offset())?;
    let matrix_offset = if version == 0 { 40 } else { 52 };
    let dims_offset = matrix_offset + 36;

    let a = reader.read_u32_be(tkhd.body_offset() + matrix_offset)? as i32;
    let b = reader.read_u32_be(tkhd.body_offset() + matrix_offset + 4)? as i32;
    let clockwise_degrees = matrix_to_clockwise_degrees(a, b);
    let rotation = Rotation::from_clockwise_degrees(clockwise_degrees);

    let width_fixed = reader.read_u32_be(tkhd.body_offset() + dims_offset)?;
    let height_fixed = reader.read_u32_be(tkhd.body_offset() + dims_offset + 4)?;
    Ok((width_fixed >> 16, height_fixed >> 16, rotation))
}

/// Recognize the four axis-aligned display matrices ISO 14496-12 §8.5.2
/// itself documents (identity / 90 / 180 / 270 clockwise); anything else
/// (shear, arbitrary rotation) is treated as unrotated.
fn matrix_to_clockwise_degrees(a: i32, b: i32) -> u16 {
    const UNITY: i32 = 0x0001_0000;
    match (a, b) {
        (UNITY, 0) => 0,
        (0, UNITY) => 90,
        (x, 0) if x == -UNITY => 180,
        (0, y) if y == -UNITY => 270,
        _ => 0,
    }
}

fn parse_cover_art(reader: &mut Reader<'_>, moov: &BoxHeader, moov_end: u64) -> Result<Vec<Candidate>> {
    let Some(udta) = bmff::find_box(reader, moov.body_offset(), moov_end, b"udta")? else {
        return Ok(Vec::new());
    };
    let udta_end = udta.offset + udta.size;
    let Some(meta) = bmff::find_box(reader, udta.body_offset(), udta_end, b"meta")? else {
        return Ok(Vec::new());
    };
    let meta_end = meta.offset + meta.size;
    let (_, _) = read_full_box_header(reader, meta.body_offset())?;
    let Some(ilst) = bmff::find_box(reader, meta.body_offset() + 4, meta_end, b"ilst")? else {
        return Ok(Vec::new());
    };
    let ilst_end = ilst.offset + ilst.size;

    let items = bmff::walk_boxes(reader, ilst.body_offset(), ilst_end)?;
    let mut out = Vec::new();
    for item in items {
        if !matches!(&item.kind, b"covr" | b"snal" | b"tnal") {
            continue;
        }
        let item_end = item.offset + item.size;
        let Some(data) = bmff::find_box(reader, item.body_offset(), item_end, b"data")? else {
            continue;
        };
        // `data` body: 4-byte type indicator + 4-byte locale, payload follows.
        const DATA_HEADER: u64 = 8;
        if data.body_size() <= DATA_HEADER {
            continue;
        }
        out.push(Candidate {
            offset: data.body_offset() + DATA_HEADER,
            length: data.body_size() - DATA_HEADER,
            width: None,
            height: None,
            format: ThumbnailFormat::Jpeg,
            payload: Payload::Raw,
        });
    }
    Ok(out)
}

fn parse_first_frame(
    reader: &mut Reader<'_>,
    trak: &BoxHeader,
    trak_end: u64,
    width: u32,
    height: u32,
) -> Result<Option<Candidate>> {
    let Some(mdia) = bmff::find_box(reader, trak.body_offset(), trak_end, b"mdia")? else {
        return Ok(None);
    };
    let mdia_end = mdia.offset + mdia.size;
    let Some(minf) = bmff::find_box(reader, mdia.body_offset(), mdia_end, b"minf")? else {
        return Ok(None);
    };
    let minf_end = minf.offset + minf.size;
    let Some(stbl) = bmff::find_box(reader, minf.body_offset(), minf_end, b"stbl")? else {
        return Ok(None);
    };
    let stbl_end = stbl.offset + stbl.size;

    let Some(stsd) = bmff::find_box(reader, stbl.body_offset(), stbl_end, b"stsd")? else {
        return Ok(None);
    };
    let sample_entries = bmff::walk_boxes(reader, stsd.body_offset() + 8, stsd.offset + stsd.size)?;
    let Some(entry) = sample_entries.first() else {
        return Ok(None);
    };
    if !matches!(&entry.kind, b"hvc1" | b"hev1") {
        return Ok(None); // only HEVC elementary streams are re-wrapped
    }
    const VISUAL_SAMPLE_ENTRY_LEN: u64 = 78;
    let entry_end = entry.offset + entry.size;
    let Some(hvcc) = bmff::find_box(reader, entry.body_offset() + VISUAL_SAMPLE_ENTRY_LEN, entry_end, b"hvcC")? else {
        return Ok(None);
    };
    let hvcc_body = reader.read(hvcc.body_offset(), hvcc.body_size() as u32)?;

    let offset = first_chunk_offset(reader, &stbl, stbl_end)?;
    let length = first_sample_size(reader, &stbl, stbl_end)?;
    let (Some(offset), Some(length)) = (offset, length) else {
        return Ok(None);
    };

    Ok(Some(Candidate {
        offset,
        length,
        width: Some(width),
        height: Some(height),
        format: ThumbnailFormat::Heic,
        payload: Payload::SynthesizeHeic { hvcc: hvcc_body },
    }))
}

fn first_chunk_offset(reader: &mut Reader<'_>, stbl: &BoxHeader, stbl_end: u64) -> Result<Option<u64>> {
    if let Some(stco) = bmff::find_box(reader, stbl.body_offset(), stbl_end, b"stco")? {
        return Ok(Some(reader.read_u32_be(stco.body_offset() + 8)? as u64));
    }
    if let Some(co64) = bmff::find_box(reader, stbl.body_offset(), stbl_end, b"co64")? {
        return Ok(Some(reader.read_u64_be(co64.body_offset() + 8)?));
    }
    Ok(None)
}

fn first_sample_size(reader: &mut Reader<'_>, stbl: &BoxHeader, stbl_end: u64) -> Result<Option<u64>> {
    let Some(stsz) = bmff::find_box(reader, stbl.body_offset(), stbl_end, b"stsz")? else {
        return Ok(None);
    };
    let uniform_size = reader.read_u32_be(stsz.body_offset() + 4)?;
    if uniform_size != 0 {
        return Ok(Some(uniform_size as u64));
    }
    Ok(Some(reader.read_u32_be(stsz.body_offset() + 12)? as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::MemoryHostReader;
    use crate::test_support::build_mp4_with_cover_art;

    #[test]
    fn reads_dimensions_and_cover_art() {
        let cover = vec![0xFF, 0xD8, 0x00, 0x11, 0xFF, 0xD9];
        let data = build_mp4_with_cover_art(1920, 1080, cover.clone());
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = Mp4Parser::new();
        let meta = parser.metadata(&mut reader).unwrap();
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);

        let thumbs = parser.list_thumbnails(&mut reader).unwrap();
        assert_eq!(thumbs.len(), 1);
        let payload = parser.get_thumbnail(&mut reader, 0).unwrap();
        assert_eq!(payload, cover);
    }

    #[test]
    fn rejects_missing_moov() {
        let data = vec![0u8; 16];
        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let mut parser = Mp4Parser::new();
        let err = parser.metadata(&mut reader).unwrap_err();
        assert!(matches!(err, Error::MetadataMissing("moov")));
    }
}
