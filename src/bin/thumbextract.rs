//! Command-line front end for the thumbextract library

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use thumbextract::{Dispatcher, Error, FormatTag};

/// Extract an embedded thumbnail from a HEIF/HEIC, JPEG, Sony ARW, or MP4 file
#[derive(Parser)]
#[command(name = "thumbextract")]
#[command(about = "Extracts the best-fit embedded thumbnail from an image or video file")]
struct Cli {
    /// Input file
    path: PathBuf,

    /// Container format (auto-detected from the extension if omitted)
    #[arg(short, long, value_enum)]
    format: Option<CliFormat>,

    /// Minimum acceptable short side, in pixels
    #[arg(short = 's', long)]
    min_short_side: Option<u32>,

    /// Write the selected thumbnail here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List every candidate instead of extracting one
    #[arg(short, long)]
    list: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliFormat {
    Heif,
    Jpeg,
    Arw,
    Mp4,
}

impl From<CliFormat> for FormatTag {
    fn from(f: CliFormat) -> Self {
        match f {
            CliFormat::Heif => FormatTag::Heif,
            CliFormat::Jpeg => FormatTag::Jpeg,
            CliFormat::Arw => FormatTag::Arw,
            CliFormat::Mp4 => FormatTag::Mp4,
        }
    }
}

fn detect_format(path: &std::path::Path) -> anyhow::Result<FormatTag> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    Ok(match ext.as_str() {
        "heic" | "heif" => FormatTag::Heif,
        "jpg" | "jpeg" => FormatTag::Jpeg,
        "arw" => FormatTag::Arw,
        "mp4" | "mov" | "m4v" => FormatTag::Mp4,
        other => bail!("cannot infer a container format from extension {other:?}; pass --format"),
    })
}

/// Adapts a `std::fs::File` to the library's host-reader capability
struct FileHostReader(File);

impl thumbextract::HostReader for FileHostReader {
    fn read(&mut self, offset: u64, length: u32) -> thumbextract::Result<Vec<u8>> {
        self.0.seek(SeekFrom::Start(offset)).map_err(Error::from)?;
        let mut buf = vec![0u8; length as usize];
        self.0.read_exact(&mut buf).map_err(Error::from)?;
        Ok(buf)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber_init();

    let cli = Cli::parse();
    let tag = match cli.format {
        Some(f) => f.into(),
        None => detect_format(&cli.path)?,
    };

    let file = File::open(&cli.path)
        .with_context(|| format!("opening {}", cli.path.display()))?;
    let mut host = FileHostReader(file);

    let mut dispatcher = Dispatcher::new(tag);
    let candidates = dispatcher
        .list_thumbnails(&mut host)
        .context("listing thumbnails")?;

    if candidates.is_empty() {
        bail!("no embedded thumbnails found in {}", cli.path.display());
    }

    if cli.list {
        for (i, c) in candidates.iter().enumerate() {
            println!(
                "{i}: {} bytes, {}x{}, format {}, rotation {}",
                c.byte_length,
                c.width.map(|w| w.to_string()).unwrap_or_else(|| "?".into()),
                c.height.map(|h| h.to_string()).unwrap_or_else(|| "?".into()),
                c.format.as_str(),
                c.rotation.map(|r| r.degrees()).unwrap_or(0),
            );
        }
        return Ok(());
    }

    let index = thumbextract::selector::select(&candidates, cli.min_short_side)
        .context("selecting a thumbnail")?;
    let bytes = dispatcher
        .get_thumbnail(&mut host, index)
        .context("extracting the selected thumbnail")?;

    match cli.output {
        Some(path) => {
            std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            std::io::stdout().write_all(&bytes)?;
        }
    }

    Ok(())
}

fn tracing_subscriber_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
