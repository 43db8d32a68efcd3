//! Stylize images by color quantization.
//!
//! For every cluster count `k` of a [`ClusterRange`] the image is reduced to
//! `k` representative colors found with k-means, and every pixel is replaced
//! by its nearest representative. The crate ships three front ends over the
//! same [`Styler`]:
//!
//! - [`style_bytes`], a plain Rust call used by the CLI,
//! - [`wasm::style_variants`], for browsers,
//! - [`server`], an HTTP upload service (feature `server`).

pub mod codec;
pub mod error;
pub mod range;
pub mod styler;
pub mod wasm;

#[cfg(feature = "server")]
pub mod server;

pub use codec::{decode_image, encode_image, palette_hex, OutputFormat};
pub use error::StyleError;
pub use range::{ClusterRange, CLUSTER_CEILING};
pub use styler::{ColorSpace, StyleSet, Styler, Stylized};

/// A styled variant after encoding.
#[derive(Clone, Debug)]
pub struct EncodedVariant {
    pub clusters: usize,
    pub bytes: Vec<u8>,
    pub palette: Vec<String>,
}

/// Convert an uploaded image into its stylized variants.
///
/// Steps performed:
/// 1. Decode `input` into an RGB pixel array (alpha is dropped).
/// 2. For every `k` in `range`, quantize the image to `k` colors.
/// 3. Encode each variant with `format` and render its palette as hex.
///
/// Variants are returned in ascending `k`. A failure at any `k` fails the
/// whole call.
pub fn style_bytes(
    input: &[u8],
    range: ClusterRange,
    styler: &Styler,
    format: OutputFormat,
) -> Result<Vec<EncodedVariant>, StyleError> {
    let image = decode_image(input)?;
    style_image(&image, range, styler, format)
}

/// Same as [`style_bytes`] for an image that is already decoded.
pub fn style_image(
    image: &image::RgbImage,
    range: ClusterRange,
    styler: &Styler,
    format: OutputFormat,
) -> Result<Vec<EncodedVariant>, StyleError> {
    let styles = styler.generate_styles_in(image, range)?;

    styles
        .into_values()
        .map(|styled| -> Result<EncodedVariant, StyleError> {
            Ok(EncodedVariant {
                clusters: styled.clusters,
                palette: styled.palette_hex(),
                bytes: encode_image(&styled.image, format)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn style_bytes_returns_ascending_variants() {
        let img = RgbImage::from_fn(12, 12, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 90]));
        let png = encode_image(&img, OutputFormat::Png).unwrap();

        let range = ClusterRange::new(2, 4).unwrap();
        let variants = style_bytes(&png, range, &Styler::new(), OutputFormat::Png).unwrap();

        assert_eq!(
            variants.iter().map(|v| v.clusters).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
        for variant in &variants {
            assert_eq!(variant.palette.len(), variant.clusters);
            let decoded = decode_image(&variant.bytes).unwrap();
            assert_eq!(decoded.dimensions(), (12, 12));
        }
    }

    #[test]
    fn style_bytes_rejects_undecodable_input() {
        let range = ClusterRange::default();
        let err = style_bytes(b"\x00\x01", range, &Styler::new(), OutputFormat::Png).unwrap_err();
        assert!(matches!(err, StyleError::Decode(_)));
    }
}
