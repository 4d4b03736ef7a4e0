//! Minimal HEIC container synthesis
//!
//! Wraps a raw HEVC access unit (plus its `hvcC` decoder configuration
//! record) in the smallest valid ISOBMFF HEIF file a reader could open:
//! `ftyp` + `meta` (single `hvc1` item, all-essential properties) + `mdat`.
//! Used when a discovered thumbnail candidate is itself coded as HEVC rather
//! than JPEG, since callers expect a self-contained, openable payload either way.

use crate::error::Result;
use crate::metadata::Rotation;

const ITEM_ID: u16 = 1;

pub(crate) fn write_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

pub(crate) fn write_full_box(kind: &[u8; 4], version: u8, flags: u32, rest: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + rest.len());
    body.push(version);
    body.extend_from_slice(&flags.to_be_bytes()[1..4]);
    body.extend_from_slice(rest);
    write_box(kind, &body)
}

fn build_ftyp() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"heic"); // major brand
    body.extend_from_slice(&0u32.to_be_bytes()); // minor version
    body.extend_from_slice(b"mif1");
    body.extend_from_slice(b"heic");
    write_box(b"ftyp", &body)
}

fn build_hdlr() -> Vec<u8> {
    let mut rest = Vec::new();
    rest.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
    rest.extend_from_slice(b"pict"); // handler_type
    rest.extend_from_slice(&[0u8; 12]); // reserved
    rest.push(0); // empty name
    write_full_box(b"hdlr", 0, 0, &rest)
}

fn build_pitm() -> Vec<u8> {
    write_full_box(b"pitm", 0, 0, &ITEM_ID.to_be_bytes())
}

fn build_iinf() -> Vec<u8> {
    let mut infe_rest = Vec::new();
    infe_rest.extend_from_slice(&ITEM_ID.to_be_bytes());
    infe_rest.extend_from_slice(&0u16.to_be_bytes()); // protection index
    infe_rest.extend_from_slice(b"hvc1");
    infe_rest.push(0); // empty item name
    let infe = write_full_box(b"infe", 2, 0, &infe_rest);

    let mut rest = Vec::new();
    rest.extend_from_slice(&1u16.to_be_bytes()); // entry_count
    rest.extend_from_slice(&infe);
    write_full_box(b"iinf", 0, 0, &rest)
}

fn build_iprp(hvcc: &[u8], width: u32, height: u32, rotation: Rotation) -> Vec<u8> {
    let hvcc_box = write_box(b"hvcC", hvcc);

    let mut ispe_rest = Vec::new();
    ispe_rest.extend_from_slice(&width.to_be_bytes());
    ispe_rest.extend_from_slice(&height.to_be_bytes());
    let ispe_box = write_full_box(b"ispe", 0, 0, &ispe_rest);

    let irot_box = write_box(b"irot", &[rotation.to_irot_byte()]);

    let mut ipco_body = Vec::new();
    ipco_body.extend_from_slice(&hvcc_box);
    ipco_body.extend_from_slice(&ispe_box);
    ipco_body.extend_from_slice(&irot_box);
    let ipco = write_box(b"ipco", &ipco_body);

    // Three properties, 1-based indices 1..=3, all marked essential.
    let mut ipma_rest = Vec::new();
    ipma_rest.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    ipma_rest.extend_from_slice(&ITEM_ID.to_be_bytes());
    ipma_rest.push(3); // association_count
    for idx in 1u8..=3 {
        ipma_rest.push(0x80 | idx); // essential bit set, 1-byte form
    }
    let ipma = write_full_box(b"ipma", 0, 0, &ipma_rest);

    let mut body = Vec::new();
    body.extend_from_slice(&ipco);
    body.extend_from_slice(&ipma);
    write_box(b"iprp", &body)
}

/// Build the `iloc` box, returning it with the byte offset (within the box)
/// of the extent-offset placeholder field that must be patched in afterward.
fn build_iloc_with_placeholder(payload_len: u32) -> (Vec<u8>, usize) {
    let mut rest = Vec::new();
    rest.push(0x44); // offset_size=4, length_size=4
    rest.push(0x00); // base_offset_size=0, index_size=0
    rest.extend_from_slice(&1u16.to_be_bytes()); // item_count
    rest.extend_from_slice(&ITEM_ID.to_be_bytes());
    rest.extend_from_slice(&0u16.to_be_bytes()); // data_reference_index
    rest.extend_from_slice(&1u16.to_be_bytes()); // extent_count
    let placeholder_rel = rest.len(); // position of extent_offset within `rest`
    rest.extend_from_slice(&0u32.to_be_bytes()); // extent_offset (patched later)
    rest.extend_from_slice(&payload_len.to_be_bytes()); // extent_length

    let boxed = write_full_box(b"iloc", 0, 0, &rest);
    // `rest` starts 4 bytes (version+flags) into the full-box body, which
    // itself starts 8 bytes into the box (header).
    let placeholder_abs = 8 + 4 + placeholder_rel;
    (boxed, placeholder_abs)
}

/// Synthesize a minimal HEIC file wrapping `payload` (a raw HEVC access
/// unit) as the single `hvc1` primary item.
pub fn synthesize_heic(
    payload: &[u8],
    hvcc: &[u8],
    width: u32,
    height: u32,
    rotation: Option<Rotation>,
) -> Result<Vec<u8>> {
    let rotation = rotation.unwrap_or(Rotation::NONE);
    let ftyp = build_ftyp();

    let mut meta_rest = Vec::new();
    meta_rest.extend_from_slice(&build_hdlr());
    meta_rest.extend_from_slice(&build_pitm());
    meta_rest.extend_from_slice(&build_iinf());
    meta_rest.extend_from_slice(&build_iprp(hvcc, width, height, rotation));
    let (iloc, iloc_placeholder_rel) = build_iloc_with_placeholder(payload.len() as u32);
    let iloc_offset_in_meta_rest = meta_rest.len();
    meta_rest.extend_from_slice(&iloc);

    let mut meta = write_full_box(b"meta", 0, 0, &meta_rest);

    let mdat_offset = (ftyp.len() + meta.len() + 8) as u32;
    // `meta` = 8-byte box header + 4-byte full-box version/flags + `meta_rest`.
    let patch_at = 12 + iloc_offset_in_meta_rest + iloc_placeholder_rel;
    meta[patch_at..patch_at + 4].copy_from_slice(&mdat_offset.to_be_bytes());

    let mut out = Vec::with_capacity(ftyp.len() + meta.len() + 8 + payload.len());
    out.extend_from_slice(&ftyp);
    out.extend_from_slice(&meta);
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"mdat");
    out.extend_from_slice(payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmff;
    use crate::reader::{MemoryHostReader, Reader};

    #[test]
    fn synthesized_heic_round_trips_through_the_box_walker() {
        let payload = vec![0xAAu8; 32];
        let hvcc = vec![1, 2, 3, 4];
        let data = synthesize_heic(&payload, &hvcc, 160, 120, Some(Rotation::from_degrees_ccw(90)))
            .unwrap();

        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let boxes = bmff::walk_boxes(&mut reader, 0, data.len() as u64).unwrap();
        assert_eq!(boxes.len(), 3);
        assert_eq!(&boxes[0].kind, b"ftyp");
        assert_eq!(&boxes[1].kind, b"meta");
        assert_eq!(&boxes[2].kind, b"mdat");

        let mdat = &boxes[2];
        let stored_payload = reader.read(mdat.body_offset(), payload.len() as u32).unwrap();
        assert_eq!(stored_payload, payload);
    }

    #[test]
    fn extent_offset_points_at_mdat_payload() {
        let payload = vec![0x11u8; 10];
        let hvcc = vec![9, 9];
        let data = synthesize_heic(&payload, &hvcc, 64, 48, None).unwrap();

        let mut host = MemoryHostReader::new(&data);
        let mut reader = Reader::new(&mut host);
        let boxes = bmff::walk_boxes(&mut reader, 0, data.len() as u64).unwrap();
        let mdat = &boxes[2];
        assert_eq!(mdat.body_offset(), (data.len() - payload.len()) as u64);
    }
}
