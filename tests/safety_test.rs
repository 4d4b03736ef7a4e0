//! Defensive-bound and error-taxonomy tests
//!
//! Exercises the corruption/truncation paths called out in the design: short
//! reads are fatal, implausible counts are rejected as `CorruptStructure`
//! rather than silently truncated or guessed at, and `iloc`'s field-width
//! declarations are validated rather than assumed.

use thumbextract::test_support::{box_with, full_box_with};
use thumbextract::{Dispatcher, Error, FormatTag, HostReader};

struct FixedHost<'a>(&'a [u8]);

impl HostReader for FixedHost<'_> {
    fn read(&mut self, offset: u64, length: u32) -> thumbextract::Result<Vec<u8>> {
        let start = offset as usize;
        let end = start + length as usize;
        Ok(self.0.get(start..end).unwrap_or(&[]).to_vec())
    }
}

#[test]
fn truncated_host_read_is_fatal() {
    // A JPEG SOI marker followed by nothing: the first marker-prefix read at
    // offset 2 comes back short.
    let data = vec![0xFF, 0xD8];
    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Jpeg);
    let err = dispatcher.metadata(&mut host).unwrap_err();
    assert!(matches!(err, Error::TruncatedInput { .. }));
}

#[test]
fn jpeg_segment_with_length_under_two_is_corrupt() {
    let mut data = vec![0xFF, 0xD8]; // SOI
    data.extend_from_slice(&[0xFF, 0xE1]); // APP1 marker
    data.extend_from_slice(&1u16.to_be_bytes()); // declared length 1 (< 2, invalid)
    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Jpeg);
    let err = dispatcher.metadata(&mut host).unwrap_err();
    assert!(matches!(err, Error::CorruptStructure(_)));
}

#[test]
fn heif_iloc_extent_count_over_bound_is_corrupt() {
    // Build just enough of a meta box for the parser to reach `iloc`:
    // ftyp, then meta{pitm, iinf(1 hvc1 item), iloc(extent_count = 101)}.
    let ftyp = box_with(b"ftyp", b"heic\0\0\0\0mif1heic");

    let pitm = full_box_with(b"pitm", 0, 0, &1u16.to_be_bytes());

    let infe = full_box_with(b"infe", 2, 0, {
        let mut b = Vec::new();
        b.extend_from_slice(&1u16.to_be_bytes());
        b.extend_from_slice(&0u16.to_be_bytes());
        b.extend_from_slice(b"jpeg");
        b.push(0);
        b
    }.as_slice());
    let iinf = full_box_with(b"iinf", 0, 0, {
        let mut b = Vec::new();
        b.extend_from_slice(&1u16.to_be_bytes());
        b.extend_from_slice(&infe);
        b
    }.as_slice());

    let iloc = full_box_with(b"iloc", 0, 0, {
        let mut b = Vec::new();
        b.push(0x44); // offset_size=4, length_size=4
        b.push(0x00);
        b.extend_from_slice(&1u16.to_be_bytes()); // item_count
        b.extend_from_slice(&1u16.to_be_bytes()); // item_id
        b.extend_from_slice(&0u16.to_be_bytes()); // data_reference_index
        b.extend_from_slice(&101u16.to_be_bytes()); // extent_count: over MAX_EXTENTS_PER_ITEM
        b
    }.as_slice());

    let mut meta_rest = Vec::new();
    meta_rest.extend_from_slice(&pitm);
    meta_rest.extend_from_slice(&iinf);
    meta_rest.extend_from_slice(&iloc);
    let meta = full_box_with(b"meta", 0, 0, &meta_rest);

    let mut data = Vec::new();
    data.extend_from_slice(&ftyp);
    data.extend_from_slice(&meta);

    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Heif);
    let err = dispatcher.list_thumbnails(&mut host).unwrap_err();
    assert!(matches!(err, Error::CorruptStructure(_)));
}

#[test]
fn heif_iloc_unsupported_field_width_is_corrupt() {
    let ftyp = box_with(b"ftyp", b"heic\0\0\0\0mif1heic");
    let pitm = full_box_with(b"pitm", 0, 0, &1u16.to_be_bytes());
    let iloc = full_box_with(b"iloc", 0, 0, &[0x30, 0x00, 0, 0]); // offset_size=3: invalid

    let mut meta_rest = Vec::new();
    meta_rest.extend_from_slice(&pitm);
    meta_rest.extend_from_slice(&iloc);
    let meta = full_box_with(b"meta", 0, 0, &meta_rest);

    let mut data = Vec::new();
    data.extend_from_slice(&ftyp);
    data.extend_from_slice(&meta);

    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Heif);
    let err = dispatcher.list_thumbnails(&mut host).unwrap_err();
    assert!(matches!(err, Error::CorruptStructure(_)));
}

#[test]
fn tiff_ifd_entry_count_over_bound_is_corrupt() {
    // TIFF header + an IFD declaring far more entries than it actually has;
    // the parser must reject this before reading past the buffer.
    let mut data = Vec::new();
    data.extend_from_slice(b"II");
    data.extend_from_slice(&42u16.to_le_bytes());
    data.extend_from_slice(&8u32.to_le_bytes());
    data.extend_from_slice(&60_000u16.to_le_bytes()); // entry count, far over the bound

    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Arw);
    let err = dispatcher.metadata(&mut host).unwrap_err();
    assert!(matches!(err, Error::CorruptStructure(_)));
}

#[test]
fn arw_next_ifd_cycle_terminates_within_the_ifd_bound() {
    // IFD0 carries dimensions and points at itself as "next IFD" -- the
    // parser must still terminate (bounded by the 10-IFD walk limit) rather
    // than loop forever.
    let mut data = Vec::new();
    data.extend_from_slice(b"II");
    data.extend_from_slice(&42u16.to_le_bytes());
    data.extend_from_slice(&8u32.to_le_bytes()); // IFD0 at 8

    data.extend_from_slice(&2u16.to_le_bytes()); // 2 entries
    let entry = |tag: u16, field_type: u16, value: u32, out: &mut Vec<u8>| {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&field_type.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    };
    entry(0x0100, thumbextract_tiff_long(), 800, &mut data);
    entry(0x0101, thumbextract_tiff_long(), 600, &mut data);
    data.extend_from_slice(&8u32.to_le_bytes()); // next IFD points back at IFD0

    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Arw);
    let meta = dispatcher.metadata(&mut host).unwrap();
    assert_eq!(meta.width, 800);
    assert_eq!(meta.height, 600);
}

/// LONG field type code (TIFF 6.0 table 2); kept local since `tiff::field_type`
/// isn't part of the public API.
fn thumbextract_tiff_long() -> u16 {
    4
}

#[test]
fn heif_rejects_item_type_other_than_jpeg_or_hvc1() {
    let data = thumbextract::test_support::build_heic(100, 100, b"av01", vec![1, 2, 3, 4], None);
    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Heif);
    dispatcher.list_thumbnails(&mut host).unwrap();
    let err = dispatcher.get_thumbnail(&mut host, 0).unwrap_err();
    assert!(matches!(err, Error::UnsupportedItemType(_)));
}

#[test]
fn mp4_missing_moov_is_metadata_missing() {
    let data = vec![0u8; 8];
    let mut host = FixedHost(&data);
    let mut dispatcher = Dispatcher::new(FormatTag::Mp4);
    let err = dispatcher.metadata(&mut host).unwrap_err();
    assert!(matches!(err, Error::MetadataMissing("moov")));
}
