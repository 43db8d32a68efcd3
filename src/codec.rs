use std::fmt;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};

use crate::error::StyleError;

// ---------------------------------------------------------------------------
// Output formats
// ---------------------------------------------------------------------------

/// Quality used for JPEG output unless configured otherwise.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encoding applied to every styled variant before it leaves the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// Content type for a stored file, judged by its extension.
    pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            _ => None,
        }
    }

    /// Same format, with a different JPEG quality (clamped to 1..=100).
    pub fn with_quality(self, quality: u8) -> Self {
        match self {
            OutputFormat::Jpeg { .. } => OutputFormat::Jpeg {
                quality: quality.clamp(1, 100),
            },
            OutputFormat::Png => OutputFormat::Png,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::default()),
            "png" => Ok(OutputFormat::Png),
            other => Err(StyleError::InvalidParameter(format!(
                "unsupported output format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg { quality } => write!(f, "jpeg (quality {quality})"),
            OutputFormat::Png => f.write_str("png"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// Decode an uploaded byte stream into an RGB pixel array.
///
/// 1. Let `image` sniff the container format from the leading bytes.
/// 2. Convert to 8-bit RGB; alpha is dropped, not composited.
/// 3. Reject images with zero area.
///
/// Every failure is a [`StyleError::Decode`], i.e. the caller's fault.
pub fn decode_image(input: &[u8]) -> Result<RgbImage, StyleError> {
    let img = image::load_from_memory(input).map_err(|e| StyleError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(StyleError::Decode(format!(
            "image has zero area ({}x{})",
            rgb.width(),
            rgb.height()
        )));
    }
    Ok(rgb)
}

/// Encode `img` for storage or transfer.
///
/// 1. JPEG is written with the quality carried by the format, baseline and
///    without metadata.
/// 2. PNG is written losslessly, so palette colors survive byte for byte.
///
/// Encoder failures come back as [`StyleError::Encode`] and are not the
/// caller's fault.
pub fn encode_image(img: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, StyleError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut buf, quality)
                .encode_image(img)
                .map_err(StyleError::Encode)?;
        }
        OutputFormat::Png => {
            let mut cursor = std::io::Cursor::new(&mut buf);
            img.write_to(&mut cursor, ImageFormat::Png)
                .map_err(StyleError::Encode)?;
        }
    }
    Ok(buf)
}

/// Render palette entries as upper-case `RRGGBB` strings.
pub fn palette_hex(palette: &[Rgb<u8>]) -> Vec<String> {
    palette
        .iter()
        .map(|c| format!("{:02X}{:02X}{:02X}", c[0], c[1], c[2]))
        .collect()
}
