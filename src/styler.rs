//! Color quantization.
//!
//! A [`Styler`] reduces an image to `k` representative colors:
//!
//! 1. Every pixel becomes a sample in the configured [`ColorSpace`].
//! 2. k-means (k-means++ seeding, fixed seeds) partitions the samples; the
//!    best of `runs` fits is kept.
//! 3. Centroids are rounded and clamped to 8-bit sRGB, forming the palette.
//! 4. Every pixel is replaced by its nearest palette entry (Euclidean
//!    distance in the same color space).
//!
//! The input is never mutated and no state survives between calls, so each
//! `k` of a range is computed independently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use image::{Rgb, RgbImage};
use kmeans_colors::{get_kmeans, Calculate, Kmeans};
use palette::{IntoColor, Lab, LinSrgb, Srgb};
use tracing::{debug, instrument};

use crate::codec::palette_hex;
use crate::error::StyleError;
use crate::range::ClusterRange;

pub const DEFAULT_CLUSTERS: usize = 5;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RUNS: usize = 3;
pub const DEFAULT_MAX_ITER: usize = 50;
pub const DEFAULT_CONVERGE: f32 = 1e-4;
/// k-means labels are stored as `u8`.
pub const MAX_CLUSTERS: usize = u8::MAX as usize;

// ---------------------------------------------------------------------------
// Color spaces
// ---------------------------------------------------------------------------

/// Space in which colors are clustered and compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorSpace {
    /// Plain sRGB channel values.
    #[default]
    Rgb,
    /// CIE L*a*b* (D65), perceptually more uniform.
    Lab,
}

impl ColorSpace {
    fn coordinates(self, color: Rgb<u8>) -> [f32; 3] {
        match self {
            ColorSpace::Rgb => [color[0] as f32, color[1] as f32, color[2] as f32],
            ColorSpace::Lab => {
                let lab: Lab = Srgb::<u8>::new(color[0], color[1], color[2])
                    .into_linear::<f32>()
                    .into_color();
                [lab.l, lab.a, lab.b]
            }
        }
    }
}

impl FromStr for ColorSpace {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" | "srgb" => Ok(ColorSpace::Rgb),
            "lab" => Ok(ColorSpace::Lab),
            other => Err(StyleError::InvalidParameter(format!(
                "unknown color space '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::Rgb => f.write_str("rgb"),
            ColorSpace::Lab => f.write_str("lab"),
        }
    }
}

// ---------------------------------------------------------------------------
// Styler
// ---------------------------------------------------------------------------

/// One quantized variant of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Stylized {
    pub clusters: usize,
    pub palette: Vec<Rgb<u8>>,
    pub image: RgbImage,
}

impl Stylized {
    pub fn palette_hex(&self) -> Vec<String> {
        palette_hex(&self.palette)
    }
}

/// Variants keyed by cluster count, ascending.
pub type StyleSet = BTreeMap<usize, Stylized>;

#[derive(Clone, Debug)]
pub struct Styler {
    n_clusters: usize,
    cluster_range: ClusterRange,
    color_space: ColorSpace,
    seed: u64,
    runs: usize,
    max_iter: usize,
    converge: f32,
}

impl Default for Styler {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            cluster_range: ClusterRange::new(2, 12).unwrap_or_default(),
            color_space: ColorSpace::default(),
            seed: DEFAULT_SEED,
            runs: DEFAULT_RUNS,
            max_iter: DEFAULT_MAX_ITER,
            converge: DEFAULT_CONVERGE,
        }
    }
}

impl Styler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster count used by [`Styler::stylize`].
    pub fn with_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    /// Range walked by [`Styler::generate_styles`].
    pub fn with_cluster_range(mut self, range: ClusterRange) -> Self {
        self.cluster_range = range;
        self
    }

    /// Space used both for clustering and for the nearest-color lookup.
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Seed of the first k-means run. Run `i` uses `seed + i`, so equal
    /// seeds give byte-identical output for the same input.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of independent k-means fits per call; at least one is run.
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs.max(1);
        self
    }

    /// Iteration cap of a single k-means run; at least one.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    /// A run stops early once the centroids move less than `converge`.
    pub fn with_converge(mut self, converge: f32) -> Self {
        self.converge = converge;
        self
    }

    pub fn cluster_range(&self) -> ClusterRange {
        self.cluster_range
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Compute the `k` palette colors for `image`.
    ///
    /// 1. Reject a zero-area image and `k` outside `1..=MAX_CLUSTERS`.
    /// 2. Collect the distinct colors; return them directly if there are at
    ///    most `k`.
    /// 3. Convert every pixel into the configured color space.
    /// 4. Fit k-means `runs` times and keep the lowest-score result.
    /// 5. Convert the centroids back to 8-bit sRGB, clamping out-of-gamut
    ///    values.
    ///
    /// When the image holds `k` or fewer distinct colors the palette is those
    /// colors, in ascending order, and no clustering takes place. This also
    /// covers `k` larger than the pixel count.
    pub fn palette(&self, image: &RgbImage, k: usize) -> Result<Vec<Rgb<u8>>, StyleError> {
        check_inputs(image, k)?;

        let distinct: BTreeSet<[u8; 3]> = image.pixels().map(|p| p.0).collect();
        if distinct.len() <= k {
            debug!(
                k,
                distinct = distinct.len(),
                "fewer distinct colors than clusters, using them directly"
            );
            return Ok(distinct.into_iter().map(Rgb).collect());
        }

        let palette = match self.color_space {
            ColorSpace::Rgb => {
                let samples: Vec<Srgb> = image
                    .pixels()
                    .map(|p| Srgb::<u8>::new(p[0], p[1], p[2]).into_format())
                    .collect();
                self.fit(k, &samples)
                    .centroids
                    .iter()
                    .map(|&c| to_rgb8(c))
                    .collect()
            }
            ColorSpace::Lab => {
                let samples: Vec<Lab> = image
                    .pixels()
                    .map(|p| {
                        Srgb::<u8>::new(p[0], p[1], p[2])
                            .into_linear::<f32>()
                            .into_color()
                    })
                    .collect();
                self.fit(k, &samples)
                    .centroids
                    .iter()
                    .map(|&lab| lab_to_rgb8(lab))
                    .collect()
            }
        };
        Ok(palette)
    }

    /// Quantize `image` to the configured default cluster count.
    pub fn stylize(&self, image: &RgbImage) -> Result<Stylized, StyleError> {
        self.stylize_with(image, self.n_clusters)
    }

    /// Quantize `image` to `k` colors.
    ///
    /// 1. Build the palette with [`Styler::palette`].
    /// 2. Replace every pixel by the nearest palette entry, measured in the
    ///    configured color space. Ties go to the earlier entry.
    /// 3. Return the palette together with the new image; `image` itself is
    ///    left untouched.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn stylize_with(&self, image: &RgbImage, k: usize) -> Result<Stylized, StyleError> {
        let palette = self.palette(image, k)?;
        let image = self.remap(image, &palette)?;
        Ok(Stylized {
            clusters: k,
            palette,
            image,
        })
    }

    /// One variant per cluster count of the configured range.
    pub fn generate_styles(&self, image: &RgbImage) -> Result<StyleSet, StyleError> {
        self.generate_styles_in(image, self.cluster_range)
    }

    /// One variant per cluster count of `range`. The first failure aborts the
    /// whole range.
    pub fn generate_styles_in(
        &self,
        image: &RgbImage,
        range: ClusterRange,
    ) -> Result<StyleSet, StyleError> {
        let mut styles = StyleSet::new();
        for k in range {
            let styled = self.stylize_with(image, k)?;
            styles.insert(k, styled);
        }
        debug!(%range, variants = styles.len(), "generated styles");
        Ok(styles)
    }

    fn fit<C: Calculate + Clone>(&self, k: usize, samples: &[C]) -> Kmeans<C> {
        let mut best = get_kmeans(k, self.max_iter, self.converge, false, samples, self.seed);
        debug!(k, seed = self.seed, score = best.score, "k-means fit");
        for run in 1..self.runs {
            let seed = self.seed.wrapping_add(run as u64);
            let result = get_kmeans(k, self.max_iter, self.converge, false, samples, seed);
            debug!(k, seed, score = result.score, "k-means fit");
            if result.score < best.score {
                best = result;
            }
        }
        best
    }

    /// Replace every pixel by its nearest palette entry.
    fn remap(&self, image: &RgbImage, palette: &[Rgb<u8>]) -> Result<RgbImage, StyleError> {
        let points: Vec<[f32; 3]> = palette
            .iter()
            .map(|&c| self.color_space.coordinates(c))
            .collect();

        // Distinct source colors are usually far fewer than pixels.
        let mut lookup: HashMap<[u8; 3], Rgb<u8>> = HashMap::new();
        let mut raw = Vec::with_capacity(image.as_raw().len());
        for pixel in image.pixels() {
            let mapped = *lookup.entry(pixel.0).or_insert_with(|| {
                palette[nearest_index(&points, self.color_space.coordinates(*pixel))]
            });
            raw.extend_from_slice(&mapped.0);
        }

        RgbImage::from_raw(image.width(), image.height(), raw).ok_or(StyleError::Buffer)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_inputs(image: &RgbImage, k: usize) -> Result<(), StyleError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(StyleError::Decode(format!(
            "image has zero area ({}x{})",
            image.width(),
            image.height()
        )));
    }
    if k == 0 {
        return Err(StyleError::InvalidParameter(
            "cluster count must be at least 1".to_string(),
        ));
    }
    if k > MAX_CLUSTERS {
        return Err(StyleError::InvalidParameter(format!(
            "cluster count {k} exceeds the maximum of {MAX_CLUSTERS}"
        )));
    }
    Ok(())
}

/// Index of the closest point; ties go to the lowest index.
fn nearest_index(points: &[[f32; 3]], query: [f32; 3]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (idx, p) in points.iter().enumerate() {
        let d0 = query[0] - p[0];
        let d1 = query[1] - p[1];
        let d2 = query[2] - p[2];
        let dist = d0 * d0 + d1 * d1 + d2 * d2;
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// Round to 8 bits after clamping each channel to `0.0..=1.0`.
fn to_rgb8(color: Srgb<f32>) -> Rgb<u8> {
    let clamped = Srgb::new(
        color.red.clamp(0.0, 1.0),
        color.green.clamp(0.0, 1.0),
        color.blue.clamp(0.0, 1.0),
    );
    let c: Srgb<u8> = clamped.into_format();
    Rgb([c.red, c.green, c.blue])
}

/// Lab centroids can fall outside the sRGB gamut; those are clamped too.
fn lab_to_rgb8(lab: Lab) -> Rgb<u8> {
    let linear: LinSrgb = lab.into_color();
    to_rgb8(Srgb::from_linear(linear))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
    const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

    fn gradient() -> RgbImage {
        RgbImage::from_fn(32, 24, |x, y| {
            Rgb([(x * 8) as u8, (y * 10) as u8, ((x + y) * 4) as u8])
        })
    }

    fn corners() -> RgbImage {
        RgbImage::from_fn(2, 2, |x, y| match (x, y) {
            (0, 0) => RED,
            (1, 0) => GREEN,
            (0, 1) => BLUE,
            _ => YELLOW,
        })
    }

    fn distinct_colors(img: &RgbImage) -> usize {
        img.pixels().map(|p| p.0).collect::<HashSet<_>>().len()
    }

    fn mean_distance(a: &RgbImage, b: &RgbImage) -> f64 {
        let total: f64 = a
            .pixels()
            .zip(b.pixels())
            .map(|(p, q)| {
                (0..3)
                    .map(|c| (p[c] as f64 - q[c] as f64).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .sum();
        total / (a.width() * a.height()) as f64
    }

    #[test]
    fn output_keeps_dimensions_and_color_budget() {
        let img = gradient();
        let styler = Styler::new();
        for k in [1, 2, 5, 9] {
            let styled = styler.stylize_with(&img, k).unwrap();
            assert_eq!(styled.image.dimensions(), img.dimensions());
            assert!(distinct_colors(&styled.image) <= k, "k = {k}");
            assert_eq!(styled.palette.len(), k);
            assert_eq!(styled.clusters, k);
        }
    }

    #[test]
    fn output_colors_come_from_palette() {
        let img = gradient();
        let styled = Styler::new().stylize_with(&img, 6).unwrap();
        let palette: HashSet<_> = styled.palette.iter().copied().collect();
        assert!(styled.image.pixels().all(|p| palette.contains(p)));
    }

    #[test]
    fn same_seed_gives_identical_output() {
        let img = gradient();
        let a = Styler::new().with_seed(7).stylize_with(&img, 4).unwrap();
        let b = Styler::new().with_seed(7).stylize_with(&img, 4).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.palette, b.palette);
    }

    #[test]
    fn single_cluster_is_uniform() {
        let img = gradient();
        let styled = Styler::new().stylize_with(&img, 1).unwrap();
        let first = *styled.image.get_pixel(0, 0);
        assert!(styled.image.pixels().all(|p| *p == first));
    }

    #[test]
    fn all_black_survives_degenerate_clustering() {
        let img = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let styled = Styler::new().stylize_with(&img, 2).unwrap();
        assert!(styled.image.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert_eq!(styled.palette, vec![Rgb([0, 0, 0])]);
    }

    #[test]
    fn distinct_corners_map_to_themselves() {
        let img = corners();
        let styled = Styler::new().stylize_with(&img, 4).unwrap();
        assert_eq!(styled.image, img);
    }

    #[test]
    fn cluster_count_above_pixel_count_is_capped() {
        let img = corners();
        let styled = Styler::new().stylize_with(&img, 10).unwrap();
        assert_eq!(styled.image, img);
        assert_eq!(styled.palette.len(), 4);
    }

    #[test]
    fn fewer_clusters_than_corners_still_quantizes() {
        let img = corners();
        let styled = Styler::new().stylize_with(&img, 3).unwrap();
        assert!(distinct_colors(&styled.image) <= 3);
    }

    #[test]
    fn separated_groups_split_cleanly() {
        let img = RgbImage::from_fn(16, 8, |x, y| {
            let jitter = ((x + y) % 4) as u8;
            if x < 8 {
                Rgb([10 + jitter, 12 + jitter, 8 + jitter])
            } else {
                Rgb([240 - jitter, 236 - jitter, 238 - jitter])
            }
        });
        let styled = Styler::new().stylize_with(&img, 2).unwrap();
        let dark = *styled.image.get_pixel(0, 0);
        let light = *styled.image.get_pixel(15, 0);
        assert_ne!(dark, light);
        for (x, _, p) in styled.image.enumerate_pixels() {
            assert_eq!(*p, if x < 8 { dark } else { light });
        }
        assert!(dark[0] < 20 && light[0] > 230);
    }

    #[test]
    fn more_clusters_do_not_lose_fidelity() {
        let img = gradient();
        let styler = Styler::new();
        let coarse = styler.stylize_with(&img, 2).unwrap();
        let fine = styler.stylize_with(&img, 8).unwrap();
        assert!(mean_distance(&img, &fine.image) <= mean_distance(&img, &coarse.image));
    }

    #[test]
    fn lab_space_respects_color_budget() {
        let img = gradient();
        let styled = Styler::new()
            .with_color_space(ColorSpace::Lab)
            .stylize_with(&img, 5)
            .unwrap();
        assert_eq!(styled.image.dimensions(), img.dimensions());
        assert!(distinct_colors(&styled.image) <= 5);
    }

    #[test]
    fn generate_styles_covers_whole_range() {
        let img = gradient();
        let range = ClusterRange::new(2, 5).unwrap();
        let styles = Styler::new().generate_styles_in(&img, range).unwrap();
        assert_eq!(styles.keys().copied().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
        for (k, styled) in &styles {
            assert_eq!(styled.clusters, *k);
            assert!(distinct_colors(&styled.image) <= *k);
        }
    }

    #[test]
    fn default_range_is_two_to_twelve() {
        let styler = Styler::default();
        assert_eq!(styler.cluster_range(), ClusterRange::new(2, 12).unwrap());
        let styled = styler.stylize(&corners()).unwrap();
        assert_eq!(styled.clusters, DEFAULT_CLUSTERS);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let img = gradient();
        let styler = Styler::new();
        assert!(matches!(
            styler.stylize_with(&img, 0),
            Err(StyleError::InvalidParameter(_))
        ));
        assert!(matches!(
            styler.stylize_with(&img, MAX_CLUSTERS + 1),
            Err(StyleError::InvalidParameter(_))
        ));
        assert!(matches!(
            styler.stylize_with(&RgbImage::new(0, 0), 2),
            Err(StyleError::Decode(_))
        ));
    }

    #[test]
    fn color_space_parses() {
        assert_eq!("LAB".parse::<ColorSpace>().unwrap(), ColorSpace::Lab);
        assert_eq!("rgb".parse::<ColorSpace>().unwrap(), ColorSpace::Rgb);
        assert!("hsv".parse::<ColorSpace>().is_err());
    }

    #[test]
    fn channels_outside_unit_range_are_clamped() {
        let c = to_rgb8(Srgb::new(-0.2, 1.4, 0.5));
        assert_eq!(c[0], 0);
        assert_eq!(c[1], 255);
        assert!((127..=128).contains(&c[2]));
        assert_eq!(to_rgb8(Srgb::new(0.0, 1.0, 1.0)), Rgb([0, 255, 255]));
    }

    #[test]
    fn out_of_gamut_lab_is_clamped() {
        // Strongly positive a* maps to linear red above 1 and green below 0.
        let c = lab_to_rgb8(Lab::new(50.0, 120.0, 0.0));
        assert_eq!(c[0], 255);
        assert_eq!(c[1], 0);

        let white = lab_to_rgb8(Lab::new(100.0, 0.0, 0.0));
        assert!(white.0.iter().all(|&v| v >= 254));
        assert_eq!(lab_to_rgb8(Lab::new(0.0, 0.0, 0.0)), Rgb([0, 0, 0]));
    }

    #[test]
    fn lab_palette_stays_in_gamut_for_saturated_input() {
        let img = RgbImage::from_fn(8, 8, |x, y| match (x + y) % 3 {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 0, 255]),
            _ => Rgb([0, (x * 30) as u8, (y * 30) as u8]),
        });
        let styled = Styler::new()
            .with_color_space(ColorSpace::Lab)
            .stylize_with(&img, 2)
            .unwrap();
        assert_eq!(styled.palette.len(), 2);
        let palette: HashSet<_> = styled.palette.iter().copied().collect();
        assert!(styled.image.pixels().all(|p| palette.contains(p)));
    }

    #[test]
    fn nearest_index_prefers_first_on_ties() {
        let points = [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [10.0, 10.0, 10.0]];
        assert_eq!(nearest_index(&points, [1.0, 1.0, 1.0]), 0);
        assert_eq!(nearest_index(&points, [9.0, 9.0, 9.0]), 2);
    }
}
