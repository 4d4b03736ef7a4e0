//! Shared public data types: image metadata, thumbnail descriptors, rotation

/// Declared format of a thumbnail payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Jpeg,
    Heic,
    Unknown,
}

impl ThumbnailFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "jpeg",
            ThumbnailFormat::Heic => "heic",
            ThumbnailFormat::Unknown => "unknown",
        }
    }
}

/// Rotation canonicalized to {0, 90, 180, 270} degrees, counter-clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation(u16);

impl Rotation {
    pub const NONE: Rotation = Rotation(0);

    /// Build from an already-canonical degree value, snapping to the
    /// nearest quarter turn as a defensive measure against off-spec input.
    pub fn from_degrees_ccw(degrees: u16) -> Self {
        Rotation((degrees / 90 % 4) * 90)
    }

    /// HEIF `irot`: the low two bits of the property byte are the
    /// CCW quarter-turn count.
    pub fn from_irot_byte(b: u8) -> Self {
        Rotation(((b & 0x03) as u16) * 90)
    }

    /// Convert a clockwise angle (e.g. from an MP4 display matrix) to the
    /// canonical counter-clockwise representation.
    pub fn from_clockwise_degrees(cw: u16) -> Self {
        Rotation(((360 - (cw % 360)) % 360) as u16)
    }

    pub fn degrees(&self) -> u16 {
        self.0
    }

    /// The `irot` property byte encoding this rotation's CCW quarter-turn count
    pub fn to_irot_byte(&self) -> u8 {
        ((self.0 / 90) % 4) as u8
    }
}

/// Dimensions and (for video) duration of the primary asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds, present only for video containers
    pub duration: Option<f64>,
}

/// A candidate (or selected) thumbnail, as surfaced to callers
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailInfo {
    /// Estimated/exact byte length of the final payload
    pub byte_length: u64,
    pub format: ThumbnailFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotation: Option<Rotation>,
}

impl ThumbnailInfo {
    /// The short side in pixels, if both dimensions are known
    pub fn short_side(&self) -> Option<u32> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(w.min(h)),
            _ => None,
        }
    }
}
