//! Synthetic fixture builders for unit tests
//!
//! Each builder assembles the smallest byte stream that exercises a parser's
//! real decoding path (real box/IFD structure, not a pre-parsed stand-in), so
//! tests catch offset-arithmetic mistakes the way a malformed real file would.
//!
//! Gated behind the `test-support` feature (on by default) rather than
//! `#[cfg(test)]` alone so that `tests/*.rs` integration tests can reuse the
//! same builders the in-crate unit tests use.

use crate::metadata::Rotation;
use crate::synth::{write_box, write_full_box};
use crate::tiff;

// Re-exported so that tests/*.rs (which only sees the crate's public API) can
// hand-assemble malformed fixtures of its own rather than being limited to
// the whole-container builders below.
pub use crate::synth::{write_box as box_with, write_full_box as full_box_with};

const THUMB_ITEM_ID: u16 = 1;
const PRIMARY_ITEM_ID: u16 = 2;

/// Build a minimal valid HEIF file with one primary item (type `hvc1`, no
/// real payload) and one `thmb`-referenced thumbnail item of `item_type`
/// (typically `jpeg` or `hvc1`) wrapping `payload`.
pub fn build_heic(
    width: u32,
    height: u32,
    item_type: &[u8; 4],
    payload: Vec<u8>,
    rotation: Option<Rotation>,
) -> Vec<u8> {
    let rotation = rotation.unwrap_or(Rotation::NONE);

    let ftyp_body = {
        let mut b = Vec::new();
        b.extend_from_slice(b"heic");
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(b"mif1");
        b.extend_from_slice(b"heic");
        b
    };
    let ftyp = write_box(b"ftyp", &ftyp_body);

    let hdlr_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(b"pict");
        b.extend_from_slice(&[0u8; 12]);
        b.push(0);
        b
    };
    let hdlr = write_full_box(b"hdlr", 0, 0, &hdlr_body);

    let pitm = write_full_box(b"pitm", 0, 0, &PRIMARY_ITEM_ID.to_be_bytes());

    let infe_thumb_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&THUMB_ITEM_ID.to_be_bytes());
        b.extend_from_slice(&0u16.to_be_bytes());
        b.extend_from_slice(item_type);
        b.push(0);
        b
    };
    let infe_thumb = write_full_box(b"infe", 2, 0, &infe_thumb_body);
    let infe_primary_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
        b.extend_from_slice(&0u16.to_be_bytes());
        b.extend_from_slice(b"hvc1");
        b.push(0);
        b
    };
    let infe_primary = write_full_box(b"infe", 2, 0, &infe_primary_body);
    let iinf_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&2u16.to_be_bytes());
        b.extend_from_slice(&infe_thumb);
        b.extend_from_slice(&infe_primary);
        b
    };
    let iinf = write_full_box(b"iinf", 0, 0, &iinf_body);

    let ispe_thumb_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&width.to_be_bytes());
        b.extend_from_slice(&height.to_be_bytes());
        b
    };
    let ispe_thumb = write_full_box(b"ispe", 0, 0, &ispe_thumb_body);
    let irot_thumb = write_box(b"irot", &[rotation.to_irot_byte()]);
    // Dummy hvcC body: only present/associated when the thumbnail item itself
    // is coded as HEVC, so the synthesizer has a configuration record to copy.
    let hvcc_thumb = write_box(b"hvcC", &[0x01, 0x02, 0x03, 0x04]);
    let ispe_primary_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&(width * 2).to_be_bytes());
        b.extend_from_slice(&(height * 2).to_be_bytes());
        b
    };
    let ispe_primary = write_full_box(b"ispe", 0, 0, &ispe_primary_body);

    let mut ipco_body = Vec::new();
    ipco_body.extend_from_slice(&ispe_thumb); // index 1
    ipco_body.extend_from_slice(&irot_thumb); // index 2
    ipco_body.extend_from_slice(&hvcc_thumb); // index 3
    ipco_body.extend_from_slice(&ispe_primary); // index 4
    let ipco = write_box(b"ipco", &ipco_body);

    let is_hevc_thumb = item_type == b"hvc1";
    let ipma = write_full_box(b"ipma", 0, 0, {
        let mut b = Vec::new();
        b.extend_from_slice(&2u32.to_be_bytes()); // entry_count
        b.extend_from_slice(&THUMB_ITEM_ID.to_be_bytes());
        b.push(if is_hevc_thumb { 3 } else { 2 }); // association_count
        b.push(0x81); // essential, index 1 (ispe)
        b.push(0x82); // essential, index 2 (irot)
        if is_hevc_thumb {
            b.push(0x83); // essential, index 3 (hvcC)
        }
        b.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
        b.push(1);
        b.push(0x84); // essential, index 4 (ispe)
        b
    }.as_slice());

    let mut iprp_body = Vec::new();
    iprp_body.extend_from_slice(&ipco);
    iprp_body.extend_from_slice(&ipma);
    let iprp = write_box(b"iprp", &iprp_body);

    let iref_thmb_body = {
        let mut b = Vec::new();
        b.extend_from_slice(&THUMB_ITEM_ID.to_be_bytes());
        b.extend_from_slice(&1u16.to_be_bytes()); // reference_count
        b.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
        b
    };
    let iref = write_full_box(b"iref", 0, 0, &write_box(b"thmb", &iref_thmb_body));

    // iloc: two items, offset_size=4, length_size=4, base_offset_size=0
    let mut iloc_rest = Vec::new();
    iloc_rest.push(0x44);
    iloc_rest.push(0x00);
    iloc_rest.extend_from_slice(&2u16.to_be_bytes()); // item_count
    iloc_rest.extend_from_slice(&THUMB_ITEM_ID.to_be_bytes());
    iloc_rest.extend_from_slice(&0u16.to_be_bytes()); // data_reference_index
    iloc_rest.extend_from_slice(&1u16.to_be_bytes()); // extent_count
    let thumb_offset_rel = iloc_rest.len();
    iloc_rest.extend_from_slice(&0u32.to_be_bytes()); // extent_offset placeholder
    iloc_rest.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    iloc_rest.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
    iloc_rest.extend_from_slice(&0u16.to_be_bytes());
    iloc_rest.extend_from_slice(&1u16.to_be_bytes());
    let primary_offset_rel = iloc_rest.len();
    iloc_rest.extend_from_slice(&0u32.to_be_bytes()); // extent_offset placeholder
    iloc_rest.extend_from_slice(&0u32.to_be_bytes()); // zero-length extent

    let mut iloc = write_full_box(b"iloc", 0, 0, &iloc_rest);

    let mut meta_rest = Vec::new();
    meta_rest.extend_from_slice(&hdlr);
    meta_rest.extend_from_slice(&pitm);
    meta_rest.extend_from_slice(&iinf);
    meta_rest.extend_from_slice(&iprp);
    meta_rest.extend_from_slice(&iref);
    let iloc_offset_in_meta_rest = meta_rest.len();
    meta_rest.extend_from_slice(&iloc);

    let mut meta = write_full_box(b"meta", 0, 0, &meta_rest);

    let mdat_payload_offset = (ftyp.len() + meta.len() + 8) as u32;

    // Patch both iloc placeholders now that the mdat payload offset is known.
    // `iloc` = 8-byte header + 4-byte full-box prefix + `iloc_rest`.
    let thumb_patch_at = 12 + thumb_offset_rel;
    let primary_patch_at = 12 + primary_offset_rel;
    iloc[thumb_patch_at..thumb_patch_at + 4].copy_from_slice(&mdat_payload_offset.to_be_bytes());
    iloc[primary_patch_at..primary_patch_at + 4].copy_from_slice(&mdat_payload_offset.to_be_bytes());

    // Re-splice the patched iloc back into meta at the same position.
    let splice_at = 12 + iloc_offset_in_meta_rest;
    meta[splice_at..splice_at + iloc.len()].copy_from_slice(&iloc);

    let mut out = Vec::with_capacity(ftyp.len() + meta.len() + 8 + payload.len());
    out.extend_from_slice(&ftyp);
    out.extend_from_slice(&meta);
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"mdat");
    out.extend_from_slice(&payload);
    out
}

fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.push(0xFF);
    out.push(marker);
    out.extend_from_slice(&((2 + payload.len()) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Build a minimal JPEG: SOI, an optional APP1 carrying an EXIF IFD1
/// thumbnail, SOF0 with the given dimensions, and a SOS header (no entropy
/// data -- the parser never reads past the SOS header).
pub fn build_jpeg_with_exif_thumbnail(
    width: u16,
    height: u16,
    thumbnail: Option<Vec<u8>>,
) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];

    if let Some(thumb) = &thumbnail {
        const TIFF_HEADER_LEN: u32 = 8;
        const IFD0_LEN: u32 = 2 + 4; // zero entries + next-IFD pointer
        const IFD1_ENTRY_COUNT: u32 = 4;
        const IFD1_LEN: u32 = 2 + IFD1_ENTRY_COUNT * 12 + 4;
        let ifd1_rel_offset = TIFF_HEADER_LEN + IFD0_LEN;
        let thumb_rel_offset = ifd1_rel_offset + IFD1_LEN;

        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&TIFF_HEADER_LEN.to_le_bytes()); // IFD0 offset

        // IFD0: no entries, next IFD = IFD1
        tiff.extend_from_slice(&0u16.to_le_bytes());
        tiff.extend_from_slice(&ifd1_rel_offset.to_le_bytes());

        // IFD1: width, height, JPEGInterchangeFormat(Length)
        tiff.extend_from_slice(&(IFD1_ENTRY_COUNT as u16).to_le_bytes());
        let entry = |tag: u16, field_type: u16, value: u32, tiff: &mut Vec<u8>| {
            tiff.extend_from_slice(&tag.to_le_bytes());
            tiff.extend_from_slice(&field_type.to_le_bytes());
            tiff.extend_from_slice(&1u32.to_le_bytes());
            tiff.extend_from_slice(&value.to_le_bytes());
        };
        entry(0x0100, tiff::field_type::SHORT, width as u32, &mut tiff);
        entry(0x0101, tiff::field_type::SHORT, height as u32, &mut tiff);
        entry(0x0201, tiff::field_type::LONG, thumb_rel_offset, &mut tiff);
        entry(0x0202, tiff::field_type::LONG, thumb.len() as u32, &mut tiff);
        tiff.extend_from_slice(&0u32.to_le_bytes()); // next IFD = none

        tiff.extend_from_slice(thumb);

        let mut app1 = Vec::with_capacity(6 + tiff.len());
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg_segment(0xE1, &app1));
    }

    let mut sof0 = Vec::new();
    sof0.push(8); // precision
    sof0.extend_from_slice(&height.to_be_bytes());
    sof0.extend_from_slice(&width.to_be_bytes());
    sof0.push(3); // num components
    for id in 1u8..=3 {
        sof0.push(id);
        sof0.push(0x11);
        sof0.push(0);
    }
    out.extend_from_slice(&jpeg_segment(0xC0, &sof0));

    let mut sos = Vec::new();
    sos.push(3);
    for id in 1u8..=3 {
        sos.push(id);
        sos.push(0);
    }
    sos.extend_from_slice(&[0, 63, 0]);
    out.extend_from_slice(&jpeg_segment(0xDA, &sos));

    out
}

fn tiff_entry(tag: u16, field_type: u16, value: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
}

/// Build a minimal little-endian TIFF/ARW: IFD0 (dimensions + orientation)
/// optionally chained to an IFD1 carrying a JPEG preview via
/// JPEGInterchangeFormat(Length).
pub fn build_arw(width: u32, height: u32, orientation: u16, preview: Option<Vec<u8>>) -> Vec<u8> {
    const IFD0_ENTRY_COUNT: u32 = 3;
    const IFD0_LEN: u32 = 2 + IFD0_ENTRY_COUNT * 12 + 4;
    const IFD0_OFFSET: u32 = 8;
    let ifd1_offset = IFD0_OFFSET + IFD0_LEN;

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&IFD0_OFFSET.to_le_bytes());

    out.extend_from_slice(&(IFD0_ENTRY_COUNT as u16).to_le_bytes());
    tiff_entry(0x0100, tiff::field_type::LONG, width, &mut out);
    tiff_entry(0x0101, tiff::field_type::LONG, height, &mut out);
    tiff_entry(0x0112, tiff::field_type::SHORT, orientation as u32, &mut out);
    out.extend_from_slice(&if preview.is_some() { ifd1_offset } else { 0 }.to_le_bytes());

    if let Some(preview) = preview {
        const IFD1_ENTRY_COUNT: u32 = 2;
        const IFD1_LEN: u32 = 2 + IFD1_ENTRY_COUNT * 12 + 4;
        let preview_offset = ifd1_offset + IFD1_LEN;

        out.extend_from_slice(&(IFD1_ENTRY_COUNT as u16).to_le_bytes());
        tiff_entry(0x0201, tiff::field_type::LONG, preview_offset, &mut out);
        tiff_entry(0x0202, tiff::field_type::LONG, preview.len() as u32, &mut out);
        out.extend_from_slice(&0u32.to_le_bytes()); // next IFD

        out.extend_from_slice(&preview);
    }

    out
}

/// Build a minimal MP4 with one video track (identity display matrix) and
/// a `moov/udta/meta/ilst/covr` cover-art item.
pub fn build_mp4_with_cover_art(width: u32, height: u32, cover: Vec<u8>) -> Vec<u8> {
    let ftyp_body = {
        let mut b = Vec::new();
        b.extend_from_slice(b"mp42");
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(b"isom");
        b.extend_from_slice(b"mp42");
        b
    };
    let ftyp = write_box(b"ftyp", &ftyp_body);

    let mut mvhd_rest = vec![0u8; 96];
    mvhd_rest[8..12].copy_from_slice(&1000u32.to_be_bytes()); // timescale
    mvhd_rest[12..16].copy_from_slice(&2000u32.to_be_bytes()); // duration
    let mvhd = write_full_box(b"mvhd", 0, 0, &mvhd_rest);

    let mut tkhd_rest = vec![0u8; 80];
    tkhd_rest[36..40].copy_from_slice(&0x0001_0000u32.to_be_bytes()); // matrix a (identity)
    tkhd_rest[72..76].copy_from_slice(&(width << 16).to_be_bytes());
    tkhd_rest[76..80].copy_from_slice(&(height << 16).to_be_bytes());
    let tkhd = write_full_box(b"tkhd", 0, 0, &tkhd_rest);

    let mut hdlr_rest = vec![0u8; 21];
    hdlr_rest[4..8].copy_from_slice(b"vide");
    let hdlr = write_full_box(b"hdlr", 0, 0, &hdlr_rest);
    let mdia = write_box(b"mdia", &hdlr);

    let mut trak_body = Vec::new();
    trak_body.extend_from_slice(&tkhd);
    trak_body.extend_from_slice(&mdia);
    let trak = write_box(b"trak", &trak_body);

    let mut data_body = Vec::new();
    data_body.extend_from_slice(&0u32.to_be_bytes()); // type indicator
    data_body.extend_from_slice(&0u32.to_be_bytes()); // locale
    data_body.extend_from_slice(&cover);
    let data = write_box(b"data", &data_body);
    let covr = write_box(b"covr", &data);
    let ilst = write_box(b"ilst", &covr);
    let meta = write_full_box(b"meta", 0, 0, &ilst);
    let udta = write_box(b"udta", &meta);

    let mut moov_body = Vec::new();
    moov_body.extend_from_slice(&mvhd);
    moov_body.extend_from_slice(&trak);
    moov_body.extend_from_slice(&udta);
    let moov = write_box(b"moov", &moov_body);

    let mut out = Vec::new();
    out.extend_from_slice(&ftyp);
    out.extend_from_slice(&moov);
    out
}
