//! Brightness Augmentation
//!
//! Camera frames are converted to HSV and the value channel is scaled by a random
//! factor, simulating different lighting conditions. The network is trained on
//! the HSV representation directly, so inference inputs go through the same
//! conversion with a neutral factor (see [`preprocess_image`]).
//!
//! HSV follows the float convention of common vision libraries: hue in degrees
//! `[0, 360)`, saturation in `[0, 1]`, value on the input's 0-255 scale. The
//! result stays floating point, so a scaled value above 255 is kept as is.

use image::RgbImage;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Random value-channel scaling in HSV space
#[derive(Clone, Debug, PartialEq)]
pub struct BrightnessJitter {
    /// Inclusive lower bound of the factor
    pub min_factor: f32,
    /// Exclusive upper bound of the factor
    pub max_factor: f32,
}

impl Default for BrightnessJitter {
    fn default() -> Self {
        Self {
            min_factor: 0.1,
            max_factor: 1.1,
        }
    }
}

impl BrightnessJitter {
    /// Draw a factor uniformly from `[min_factor, max_factor)`
    pub fn sample_factor(&self, rng: &mut ChaCha8Rng) -> f32 {
        if self.max_factor <= self.min_factor {
            return self.min_factor;
        }
        rng.gen_range(self.min_factor..self.max_factor)
    }

    /// Convert to HSV and scale V by `factor`; output is HWC floats
    pub fn apply(&self, img: &RgbImage, factor: f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(img.width() as usize * img.height() as usize * 3);

        for pixel in img.pixels() {
            let [h, s, v] = rgb_to_hsv(pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
            out.push(h);
            out.push(s);
            out.push(v * factor);
        }

        out
    }

    /// Draw a factor and apply it
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let factor = self.sample_factor(rng);
        self.apply(img, factor)
    }
}

/// HSV conversion without augmentation, for inference inputs
pub fn preprocess_image(img: &RgbImage) -> Vec<f32> {
    BrightnessJitter::default().apply(img, 1.0)
}

/// Convert one RGB pixel (0-255 floats) to HSV
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> [f32; 3] {
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { delta / v } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [h, s, v]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;

    fn test_image() -> RgbImage {
        RgbImage::from_fn(8, 4, |x, y| {
            Rgb([(x * 30) as u8, (y * 60) as u8, ((x + y) * 20) as u8])
        })
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255.0, 0.0, 0.0), [0.0, 1.0, 255.0]);
        assert_eq!(rgb_to_hsv(0.0, 255.0, 0.0), [120.0, 1.0, 255.0]);
        assert_eq!(rgb_to_hsv(0.0, 0.0, 255.0), [240.0, 1.0, 255.0]);
        assert_eq!(rgb_to_hsv(0.0, 0.0, 0.0), [0.0, 0.0, 0.0]);
        assert_eq!(rgb_to_hsv(128.0, 128.0, 128.0), [0.0, 0.0, 128.0]);
    }

    #[test]
    fn test_rgb_to_hsv_negative_hue_wraps() {
        // Magenta-ish red: hue just below 360
        let [h, _, _] = rgb_to_hsv(255.0, 0.0, 10.0);
        assert!(h > 350.0 && h < 360.0);
    }

    #[test]
    fn test_apply_scales_only_value_channel() {
        let img = test_image();
        let jitter = BrightnessJitter::default();
        let base = jitter.apply(&img, 1.0);
        let factor = 0.37f32;
        let scaled = jitter.apply(&img, factor);

        assert_eq!(base.len(), 8 * 4 * 3);
        for (b, s) in base.chunks(3).zip(scaled.chunks(3)) {
            assert_eq!(b[0], s[0]);
            assert_eq!(b[1], s[1]);
            assert_eq!(s[2], b[2] * factor);
        }
    }

    #[test]
    fn test_value_is_not_clipped() {
        let img = RgbImage::from_pixel(2, 2, Rgb([250, 250, 250]));
        let out = BrightnessJitter::default().apply(&img, 1.09);
        assert!(out[2] > 255.0);
    }

    #[test]
    fn test_sample_factor_range() {
        let jitter = BrightnessJitter::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let f = jitter.sample_factor(&mut rng);
            assert!(f >= 0.1 && f < 1.1);
        }
    }

    #[test]
    fn test_augment_is_reproducible_with_seed() {
        let img = test_image();
        let jitter = BrightnessJitter::default();
        let a = jitter.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        let b = jitter.augment(&img, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_preprocess_is_neutral() {
        let img = test_image();
        let out = preprocess_image(&img);
        let p = img.get_pixel(3, 2);
        let expected = rgb_to_hsv(p[0] as f32, p[1] as f32, p[2] as f32);
        let idx = (2 * 8 + 3) * 3;
        assert_eq!(&out[idx..idx + 3], &expected[..]);
    }
}
