//! Post-processing filters applied to a generated image.
//!
//! Enhancement filters (sharpen, brightness, contrast) blend a degenerate
//! version of the image with the original:
//!
//! `out = degenerate + (original - degenerate) * strength`
//!
//! so a strength of 1.0 returns the original pixels, values above 1.0
//! exaggerate the effect and values below 1.0 pull towards the degenerate image.

use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::constants::{FILTER_STRENGTH_DEFAULT, FILTER_STRENGTH_MAX, FILTER_STRENGTH_MIN};

/// Fixed 5x5 blur: a ring of ones around an empty centre.
const BLUR_KERNEL: [[i32; 5]; 5] = [
    [1, 1, 1, 1, 1],
    [1, 0, 0, 0, 1],
    [1, 0, 0, 0, 1],
    [1, 0, 0, 0, 1],
    [1, 1, 1, 1, 1],
];
const BLUR_DIVISOR: i32 = 16;

/// Smoothing kernel used as the degenerate image when sharpening.
const SMOOTH_KERNEL: [[i32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
const SMOOTH_DIVISOR: i32 = 13;

/// Filters offered in the sidebar.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Leave the image alone.
    #[default]
    None,
    /// Fixed-radius blur, ignores strength.
    Blur,
    /// Sharpness enhancement.
    Sharpen,
    /// Brightness enhancement.
    Brightness,
    /// Contrast enhancement.
    Contrast,
}

impl FilterType {
    /// Every filter, in dropdown order.
    pub const ALL: [FilterType; 5] = [
        FilterType::None,
        FilterType::Blur,
        FilterType::Sharpen,
        FilterType::Brightness,
        FilterType::Contrast,
    ];

    /// Label shown in the filter dropdown.
    pub fn label(self) -> &'static str {
        match self {
            FilterType::None => "无",
            FilterType::Blur => "模糊",
            FilterType::Sharpen => "锐化",
            FilterType::Brightness => "亮度",
            FilterType::Contrast => "对比度",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unknown names fall through to [`FilterType::None`].
impl FromStr for FilterType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let filter = match s.trim() {
            "模糊" | "blur" => FilterType::Blur,
            "锐化" | "sharpen" => FilterType::Sharpen,
            "亮度" | "brightness" => FilterType::Brightness,
            "对比度" | "contrast" => FilterType::Contrast,
            _ => FilterType::None,
        };
        Ok(filter)
    }
}

/// Which filter to apply and how hard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// The selected filter.
    pub filter_type: FilterType,
    /// Multiplicative strength, always within the slider range.
    pub strength: f32,
}

impl FilterSpec {
    /// Builds a spec, clamping `strength` into the slider range.
    pub fn new(filter_type: FilterType, strength: f32) -> Self {
        Self {
            filter_type,
            strength: clamp_strength(strength),
        }
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            filter_type: FilterType::None,
            strength: FILTER_STRENGTH_DEFAULT,
        }
    }
}

/// Clamps a slider value, non-finite input becomes the default strength.
pub fn clamp_strength(strength: f32) -> f32 {
    if strength.is_finite() {
        strength.clamp(FILTER_STRENGTH_MIN, FILTER_STRENGTH_MAX)
    } else {
        FILTER_STRENGTH_DEFAULT
    }
}

/// Applies `spec` to `image`, returning a new image.
pub fn apply(image: &DynamicImage, spec: FilterSpec) -> DynamicImage {
    if spec.filter_type == FilterType::None {
        return image.clone();
    }
    let source = image.to_rgba8();

    let output = match spec.filter_type {
        FilterType::None => source,
        FilterType::Blur => convolve(&source, &BLUR_KERNEL, BLUR_DIVISOR),
        FilterType::Sharpen => {
            let smooth = convolve(&source, &SMOOTH_KERNEL, SMOOTH_DIVISOR);
            blend(&smooth, &source, spec.strength)
        }
        FilterType::Brightness => {
            let black = RgbaImage::from_pixel(source.width(), source.height(), Rgba([0, 0, 0, 255]));
            blend(&black, &source, spec.strength)
        }
        FilterType::Contrast => {
            let mean = mean_luminance(&source);
            let grey = RgbaImage::from_pixel(
                source.width(),
                source.height(),
                Rgba([mean, mean, mean, 255]),
            );
            blend(&grey, &source, spec.strength)
        }
    };
    DynamicImage::ImageRgba8(output)
}

/// Interpolates from `degenerate` towards `source` by `factor`, keeping the source alpha.
fn blend(degenerate: &RgbaImage, source: &RgbaImage, factor: f32) -> RgbaImage {
    RgbaImage::from_fn(source.width(), source.height(), |x, y| {
        let base = degenerate.get_pixel(x, y);
        let pixel = source.get_pixel(x, y);
        let mut out = *pixel;
        for channel in 0..3 {
            let from = f32::from(base[channel]);
            let to = f32::from(pixel[channel]);
            // clipped, then truncated towards zero
            out[channel] = (from + (to - from) * factor).clamp(0.0, 255.0) as u8;
        }
        out
    })
}

/// Rounded mean of the ITU-R 601 luma over the whole image.
fn mean_luminance(image: &RgbaImage) -> u8 {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0;
    }
    let total: u64 = image
        .pixels()
        .map(|pixel| {
            let [r, g, b, _] = pixel.0;
            (u64::from(r) * 299 + u64::from(g) * 587 + u64::from(b) * 114 + 500) / 1000
        })
        .sum();
    ((total as f64 / count as f64) + 0.5).floor().clamp(0.0, 255.0) as u8
}

/// Square convolution over the colour channels.
///
/// Pixels closer than the kernel radius to an edge are copied through
/// unchanged, as are images too small to hold a full kernel.
fn convolve<const N: usize>(image: &RgbaImage, kernel: &[[i32; N]; N], divisor: i32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let radius = (N / 2) as u32;
    if width < N as u32 || height < N as u32 {
        return image.clone();
    }

    RgbaImage::from_fn(width, height, |x, y| {
        let source = *image.get_pixel(x, y);
        if x < radius || y < radius || x >= width - radius || y >= height - radius {
            return source;
        }
        let mut sums = [0i32; 3];
        for (ky, row) in kernel.iter().enumerate() {
            let sample_y = y + ky as u32 - radius;
            for (kx, weight) in row.iter().enumerate() {
                if *weight == 0 {
                    continue;
                }
                let sample = image.get_pixel(x + kx as u32 - radius, sample_y);
                for (channel, sum) in sums.iter_mut().enumerate() {
                    *sum += i32::from(sample[channel]) * weight;
                }
            }
        }
        let mut out = source;
        for (channel, sum) in sums.iter().enumerate() {
            // integer division rounding half up; all sums are non-negative
            out[channel] = ((sum + divisor / 2) / divisor).clamp(0, 255) as u8;
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(32, 32, |x, y| {
            Rgba([(x * 7) as u8, (y * 7) as u8, ((x + y) * 3) as u8, 255])
        }))
    }

    fn mean_abs_diff(a: &DynamicImage, b: &DynamicImage) -> f64 {
        let a = a.to_rgba8();
        let b = b.to_rgba8();
        let total: u64 = a
            .pixels()
            .zip(b.pixels())
            .map(|(pa, pb)| {
                (0..3)
                    .map(|c| u64::from(pa[c].abs_diff(pb[c])))
                    .sum::<u64>()
            })
            .sum();
        total as f64 / (a.width() * a.height() * 3) as f64
    }

    #[test]
    fn none_is_identity() {
        let image = gradient();
        for strength in [0.1, 1.0, 2.0] {
            let out = apply(&image, FilterSpec::new(FilterType::None, strength));
            assert_eq!(out.as_bytes(), image.as_bytes());
        }
    }

    #[test]
    fn enhancements_at_one_are_identity() {
        let image = gradient();
        for filter in [FilterType::Sharpen, FilterType::Brightness, FilterType::Contrast] {
            let out = apply(&image, FilterSpec::new(filter, 1.0));
            assert_eq!(out.to_rgba8(), image.to_rgba8(), "{filter} at 1.0");
        }
    }

    #[test]
    fn enhancements_converge_towards_input() {
        let image = gradient();
        for filter in [FilterType::Sharpen, FilterType::Brightness, FilterType::Contrast] {
            for ladder in [[0.1, 0.4, 0.7, 1.0], [2.0, 1.6, 1.3, 1.0]] {
                let diffs: Vec<f64> = ladder
                    .iter()
                    .map(|strength| mean_abs_diff(&apply(&image, FilterSpec::new(filter, *strength)), &image))
                    .collect();
                for pair in diffs.windows(2) {
                    assert!(pair[1] <= pair[0], "{filter}: {diffs:?}");
                }
                assert_eq!(diffs[3], 0.0);
            }
        }
    }

    #[test]
    fn brightness_scales_every_channel() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            512,
            512,
            image::Rgb([100, 40, 200]),
        ));
        let out = apply(&image, FilterSpec::new(FilterType::Brightness, 1.5)).to_rgba8();
        assert_eq!(out.dimensions(), (512, 512));
        assert!(out.pixels().all(|pixel| pixel.0 == [150, 60, 255, 255]));
    }

    #[test]
    fn enhancement_truncates_fractional_channels() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([101, 33, 7])));
        let out = apply(&image, FilterSpec::new(FilterType::Brightness, 1.5)).to_rgba8();
        assert!(out.pixels().all(|pixel| pixel.0 == [151, 49, 10, 255]));
    }

    #[test]
    fn contrast_zero_side_flattens_to_mean() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        }));
        let out = apply(&image, FilterSpec::new(FilterType::Contrast, 0.1)).to_rgba8();
        // mean is 100, 0.1 keeps a tenth of the distance
        assert_eq!(out.get_pixel(0, 0).0, [90, 90, 90, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [110, 110, 110, 255]);
    }

    #[test]
    fn blur_ignores_strength() {
        let image = gradient();
        let weak = apply(&image, FilterSpec::new(FilterType::Blur, 0.1));
        let strong = apply(&image, FilterSpec::new(FilterType::Blur, 2.0));
        assert_eq!(weak.as_bytes(), strong.as_bytes());
        assert_ne!(weak.to_rgba8(), image.to_rgba8());
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([12, 34, 56, 200])));
        let out = apply(&image, FilterSpec::new(FilterType::Blur, 1.0)).to_rgba8();
        assert!(out.pixels().all(|pixel| pixel.0 == [12, 34, 56, 200]));
    }

    #[test]
    fn kernels_leave_the_border_untouched() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_fn(9, 9, |x, y| {
            let value = if (x + y) % 2 == 0 { 240 } else { 10 };
            Rgba([value, value, value, 255])
        }));
        let source = image.to_rgba8();

        let blurred = apply(&image, FilterSpec::new(FilterType::Blur, 1.0)).to_rgba8();
        let smoothed = convolve(&source, &SMOOTH_KERNEL, SMOOTH_DIVISOR);
        for (x, y, pixel) in source.enumerate_pixels() {
            let blur_border = x < 2 || y < 2 || x > 6 || y > 6;
            let smooth_border = x < 1 || y < 1 || x > 7 || y > 7;
            assert_eq!(blurred.get_pixel(x, y) == pixel, blur_border, "blur at {x},{y}");
            assert_eq!(smoothed.get_pixel(x, y) == pixel, smooth_border, "smooth at {x},{y}");
        }
    }

    #[test]
    fn kernels_skip_images_smaller_than_the_kernel() {
        let image = RgbaImage::from_fn(4, 4, |x, y| Rgba([(x * 50) as u8, (y * 50) as u8, 0, 255]));
        assert_eq!(convolve(&image, &BLUR_KERNEL, BLUR_DIVISOR), image);
    }

    #[test]
    fn unknown_names_fall_through_to_none() {
        assert_eq!("色彩".parse::<FilterType>(), Ok(FilterType::None));
        assert_eq!("".parse::<FilterType>(), Ok(FilterType::None));
        assert_eq!("亮度".parse::<FilterType>(), Ok(FilterType::Brightness));
        assert_eq!("contrast".parse::<FilterType>(), Ok(FilterType::Contrast));
    }

    #[test]
    fn strength_is_clamped() {
        assert_eq!(FilterSpec::new(FilterType::Sharpen, 9.0).strength, 2.0);
        assert_eq!(FilterSpec::new(FilterType::Sharpen, -1.0).strength, 0.1);
        assert_eq!(FilterSpec::new(FilterType::Sharpen, f32::NAN).strength, 1.0);
    }
}
