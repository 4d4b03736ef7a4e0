//! Thumbnail extraction for HEIF/HEIC, JPEG (EXIF/MPF), Sony ARW, and MP4.
//!
//! This crate locates and extracts embedded thumbnail/preview images from
//! four container families without requiring the caller to hand over a
//! `File` or any other concrete I/O type: every parser talks to the host
//! through the [`HostReader`] capability, a single `read(offset, length)`
//! entry point. Hosts that already have a file, a memory-mapped buffer, or
//! an HTTP range-request client can all implement it directly.
//!
//! # Example
//!
//! ```no_run
//! use thumbextract::{Dispatcher, FormatTag};
//!
//! # fn main() -> thumbextract::Result<()> {
//! let mut file = std::fs::File::open("photo.heic")?;
//! let mut read = |offset: u64, length: u32| -> thumbextract::Result<Vec<u8>> {
//!     use std::io::{Read, Seek, SeekFrom};
//!     let mut buf = vec![0u8; length as usize];
//!     file.seek(SeekFrom::Start(offset))?;
//!     file.read_exact(&mut buf)?;
//!     Ok(buf)
//! };
//!
//! let mut dispatcher = Dispatcher::new(FormatTag::Heif);
//! let candidates = dispatcher.list_thumbnails(&mut read)?;
//! if let Some(index) = thumbextract::selector::select(&candidates, Some(256)) {
//!     let bytes = dispatcher.get_thumbnail(&mut read, index)?;
//!     println!("selected a {}-byte thumbnail", bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

mod bmff;
pub mod error;
pub mod formats;
pub mod metadata;
pub mod reader;
pub mod selector;
mod synth;
mod tiff;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{Error, Result};
pub use formats::{Dispatcher, FormatTag, ImageReader};
pub use metadata::{ImageMetadata, Rotation, ThumbnailFormat, ThumbnailInfo};
pub use reader::{ByteOrder, HostReader, MemoryHostReader, Reader};
