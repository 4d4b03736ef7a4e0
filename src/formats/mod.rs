//! Per-format thumbnail parsers and the format dispatcher
//!
//! Every parser implements the same [`ImageReader`] capability set
//! (`list_thumbnails`, `get_thumbnail`, `metadata`). A sum-type-plus-dispatch
//! model ([`Dispatcher`]) is used instead of trait objects/inheritance,
//! mirroring the teacher's `asset::Handler` enum.

pub mod arw;
pub mod heif;
pub mod jpeg;
pub mod mp4;

use crate::error::Result;
use crate::metadata::{ImageMetadata, ThumbnailInfo};
use crate::reader::{HostReader, Reader};

/// Uniform capability every per-format parser exposes
pub trait ImageReader {
    /// Every thumbnail candidate this container holds, in the parser's own order
    fn list_thumbnails(&mut self, reader: &mut Reader<'_>) -> Result<Vec<ThumbnailInfo>>;

    /// The final, consumable payload for candidate `index`
    fn get_thumbnail(&mut self, reader: &mut Reader<'_>, index: usize) -> Result<Vec<u8>>;

    /// Primary-asset dimensions (and duration, for video)
    fn metadata(&mut self, reader: &mut Reader<'_>) -> Result<ImageMetadata>;
}

/// Format tag supplied by the caller -- the dispatcher does not sniff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Heif,
    Jpeg,
    Arw,
    Mp4,
}

/// Sum type over the four supported parsers
///
/// Construct with [`Dispatcher::new`]; all downstream calls go through the
/// uniform [`ImageReader`] capability without the caller needing to match on
/// the concrete format again.
pub enum Dispatcher {
    Heif(heif::HeifParser),
    Jpeg(jpeg::JpegParser),
    Arw(arw::SonyArwParser),
    Mp4(mp4::Mp4Parser),
}

impl Dispatcher {
    /// Instantiate the parser for `tag`. Does not touch the reader --
    /// signature validation happens lazily on first `list_thumbnails`/`metadata`
    /// call, matching each parser's own algorithm.
    pub fn new(tag: FormatTag) -> Self {
        match tag {
            FormatTag::Heif => Dispatcher::Heif(heif::HeifParser::new()),
            FormatTag::Jpeg => Dispatcher::Jpeg(jpeg::JpegParser::new()),
            FormatTag::Arw => Dispatcher::Arw(arw::SonyArwParser::new()),
            FormatTag::Mp4 => Dispatcher::Mp4(mp4::Mp4Parser::new()),
        }
    }

    pub fn list_thumbnails<H: HostReader>(
        &mut self,
        host: &mut H,
    ) -> Result<Vec<ThumbnailInfo>> {
        let mut reader = Reader::new(host);
        match self {
            Dispatcher::Heif(p) => p.list_thumbnails(&mut reader),
            Dispatcher::Jpeg(p) => p.list_thumbnails(&mut reader),
            Dispatcher::Arw(p) => p.list_thumbnails(&mut reader),
            Dispatcher::Mp4(p) => p.list_thumbnails(&mut reader),
        }
    }

    pub fn get_thumbnail<H: HostReader>(
        &mut self,
        host: &mut H,
        index: usize,
    ) -> Result<Vec<u8>> {
        let mut reader = Reader::new(host);
        match self {
            Dispatcher::Heif(p) => p.get_thumbnail(&mut reader, index),
            Dispatcher::Jpeg(p) => p.get_thumbnail(&mut reader, index),
            Dispatcher::Arw(p) => p.get_thumbnail(&mut reader, index),
            Dispatcher::Mp4(p) => p.get_thumbnail(&mut reader, index),
        }
    }

    pub fn metadata<H: HostReader>(&mut self, host: &mut H) -> Result<ImageMetadata> {
        let mut reader = Reader::new(host);
        match self {
            Dispatcher::Heif(p) => p.metadata(&mut reader),
            Dispatcher::Jpeg(p) => p.metadata(&mut reader),
            Dispatcher::Arw(p) => p.metadata(&mut reader),
            Dispatcher::Mp4(p) => p.metadata(&mut reader),
        }
    }
}
