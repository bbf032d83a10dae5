// Stochastic augmentation ops — train-mode image jitter
//
// All ops operate on decoded RGB images, before resizing, and draw their
// randomness exclusively from the rng handed in by the caller: two pipelines
// driven by identically-seeded rngs produce identical output. Every op is
// gated by its own probability `p`; with `p = 0.0` it is a no-op, with
// `p = 1.0` it always fires (which is how the tests pin behavior down).

use image::imageops;
use image::{Rgb, RgbImage};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};

/// A stochastic image transform, applied with some probability per call.
///
/// Implementations must be `Send + Sync` so a pipeline can be shared across
/// loader workers.
pub trait Augment: Send + Sync {
    /// Apply the op to `img`, drawing randomness only from `rng`.
    fn apply(&self, img: RgbImage, rng: &mut dyn RngCore) -> RgbImage;
}

/// Sample a uniform value in `(-limit, limit)`, tolerating `limit == 0`.
fn jitter(rng: &mut dyn RngCore, limit: f64) -> f64 {
    if limit > 0.0 {
        rng.gen_range(-limit..limit)
    } else {
        0.0
    }
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

// HorizontalFlip

/// Mirror the image left-to-right with probability `p`.
#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    pub p: f64,
}

impl HorizontalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Augment for HorizontalFlip {
    fn apply(&self, img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        imageops::flip_horizontal(&img)
    }
}

// Rotate90

/// Rotate by a uniformly-chosen multiple of 90° with probability `p`.
#[derive(Debug, Clone)]
pub struct Rotate90 {
    pub p: f64,
}

impl Rotate90 {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Augment for Rotate90 {
    fn apply(&self, img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        match rng.gen_range(1..=3u8) {
            1 => imageops::rotate90(&img),
            2 => imageops::rotate180(&img),
            _ => imageops::rotate270(&img),
        }
    }
}

// Affine

/// Random shift/scale/rotate with probability `p`.
///
/// `max_shift` is a fraction of the image side, `scale` a (min, max) factor
/// range, `max_rotate_deg` the rotation bound in degrees. Output pixels are
/// inverse-mapped through the affine transform and bilinearly sampled, with
/// out-of-bounds coordinates clamped to the edge.
#[derive(Debug, Clone)]
pub struct Affine {
    pub p: f64,
    pub max_shift: f64,
    pub scale: (f64, f64),
    pub max_rotate_deg: f64,
}

impl Affine {
    pub fn new(p: f64) -> Self {
        Self {
            p,
            max_shift: 0.0625,
            scale: (0.9, 1.1),
            max_rotate_deg: 15.0,
        }
    }
}

impl Augment for Affine {
    fn apply(&self, img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        let (w, h) = img.dimensions();
        let dx = jitter(rng, self.max_shift) * w as f64;
        let dy = jitter(rng, self.max_shift) * h as f64;
        let scale = if self.scale.1 > self.scale.0 {
            rng.gen_range(self.scale.0..self.scale.1)
        } else {
            self.scale.0
        };
        let angle = jitter(rng, self.max_rotate_deg).to_radians();

        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let (sin, cos) = angle.sin_cos();

        let mut out = RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                // Invert dst = R·S·(src − c) + c + t
                let fx = x as f64 - cx - dx;
                let fy = y as f64 - cy - dy;
                let sx = (cos * fx + sin * fy) / scale + cx;
                let sy = (-sin * fx + cos * fy) / scale + cy;
                out.put_pixel(x, y, bilinear(&img, sx, sy));
            }
        }
        out
    }
}

/// Bilinearly sample `img` at a fractional coordinate, clamping to edges.
fn bilinear(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = x - x0 as f64;
    let ty = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut px = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - tx) + p10[c] as f64 * tx;
        let bot = p01[c] as f64 * (1.0 - tx) + p11[c] as f64 * tx;
        px[c] = clamp_u8(top * (1.0 - ty) + bot * ty);
    }
    Rgb(px)
}

// BrightnessContrast

/// Jitter brightness and contrast with probability `p`.
///
/// `v' = a·(v − 128) + 128 + b·255` with `a ∈ [1−max_contrast, 1+max_contrast]`
/// and `b ∈ [−max_brightness, max_brightness]`.
#[derive(Debug, Clone)]
pub struct BrightnessContrast {
    pub p: f64,
    pub max_brightness: f64,
    pub max_contrast: f64,
}

impl BrightnessContrast {
    pub fn new(p: f64) -> Self {
        Self {
            p,
            max_brightness: 0.2,
            max_contrast: 0.2,
        }
    }
}

impl Augment for BrightnessContrast {
    fn apply(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        let a = 1.0 + jitter(rng, self.max_contrast);
        let b = jitter(rng, self.max_brightness) * 255.0;
        for px in img.pixels_mut() {
            for c in 0..3 {
                px[c] = clamp_u8(a * (px[c] as f64 - 128.0) + 128.0 + b);
            }
        }
        img
    }
}

// GammaJitter

/// Apply a random gamma curve `v' = 255·(v/255)^γ` with probability `p`,
/// γ drawn from `range`.
#[derive(Debug, Clone)]
pub struct GammaJitter {
    pub p: f64,
    pub range: (f64, f64),
}

impl GammaJitter {
    pub fn new(p: f64) -> Self {
        Self {
            p,
            range: (0.8, 1.25),
        }
    }
}

impl Augment for GammaJitter {
    fn apply(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        let gamma = if self.range.1 > self.range.0 {
            rng.gen_range(self.range.0..self.range.1)
        } else {
            self.range.0
        };
        let mut lut = [0u8; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            *v = clamp_u8(255.0 * (i as f64 / 255.0).powf(gamma));
        }
        for px in img.pixels_mut() {
            for c in 0..3 {
                px[c] = lut[px[c] as usize];
            }
        }
        img
    }
}

// ChannelShift

/// Shift each RGB channel by an independent uniform offset with
/// probability `p`. `max_shift` is a fraction of full range.
#[derive(Debug, Clone)]
pub struct ChannelShift {
    pub p: f64,
    pub max_shift: f64,
}

impl ChannelShift {
    pub fn new(p: f64) -> Self {
        Self { p, max_shift: 0.1 }
    }
}

impl Augment for ChannelShift {
    fn apply(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        let shifts = [
            jitter(rng, self.max_shift) * 255.0,
            jitter(rng, self.max_shift) * 255.0,
            jitter(rng, self.max_shift) * 255.0,
        ];
        for px in img.pixels_mut() {
            for c in 0..3 {
                px[c] = clamp_u8(px[c] as f64 + shifts[c]);
            }
        }
        img
    }
}

// GaussianNoise

/// Add per-value Gaussian noise `N(0, std·255)` with probability `p`.
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    pub p: f64,
    pub std_dev: f64,
}

impl GaussianNoise {
    pub fn new(p: f64) -> Self {
        Self { p, std_dev: 0.02 }
    }
}

impl Augment for GaussianNoise {
    fn apply(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p || self.std_dev <= 0.0 {
            return img;
        }
        // std_dev is positive here, so Normal::new cannot fail
        let normal = Normal::new(0.0, self.std_dev * 255.0).unwrap();
        for px in img.pixels_mut() {
            for c in 0..3 {
                px[c] = clamp_u8(px[c] as f64 + normal.sample(&mut *rng));
            }
        }
        img
    }
}

// Equalize

/// Tiled local-contrast enhancement on the luma channel with
/// probability `p`.
///
/// The image is divided into a `tiles × tiles` grid; each tile's luma
/// histogram is equalized independently and the RGB values are rescaled by
/// the luma ratio. Tiles are processed without cross-tile blending, which is
/// acceptable at training resolutions.
#[derive(Debug, Clone)]
pub struct Equalize {
    pub p: f64,
    pub tiles: u32,
}

impl Equalize {
    pub fn new(p: f64) -> Self {
        Self { p, tiles: 8 }
    }
}

fn luma(px: &Rgb<u8>) -> u8 {
    clamp_u8(0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64)
}

impl Augment for Equalize {
    fn apply(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> RgbImage {
        if rng.gen::<f64>() >= self.p {
            return img;
        }
        let (w, h) = img.dimensions();
        let tiles = self.tiles.max(1);
        let tile_w = (w + tiles - 1) / tiles;
        let tile_h = (h + tiles - 1) / tiles;
        if tile_w == 0 || tile_h == 0 {
            return img;
        }

        for ty in (0..h).step_by(tile_h as usize) {
            for tx in (0..w).step_by(tile_w as usize) {
                let x1 = (tx + tile_w).min(w);
                let y1 = (ty + tile_h).min(h);
                equalize_tile(&mut img, tx, ty, x1, y1);
            }
        }
        img
    }
}

/// Histogram-equalize the luma of one tile, scaling RGB accordingly.
fn equalize_tile(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) {
    let count = ((x1 - x0) * (y1 - y0)) as u64;
    if count == 0 {
        return;
    }

    let mut hist = [0u64; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[luma(img.get_pixel(x, y)) as usize] += 1;
        }
    }

    // cdf → mapping, anchored so the lowest occupied bin maps to 0
    let mut cdf = [0u64; 256];
    let mut acc = 0u64;
    for (i, &hv) in hist.iter().enumerate() {
        acc += hv;
        cdf[i] = acc;
    }
    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    if count == cdf_min {
        // Single-valued tile: nothing to spread
        return;
    }

    let mut map = [0u8; 256];
    for i in 0..256 {
        let num = cdf[i].saturating_sub(cdf_min) as f64;
        let den = (count - cdf_min) as f64;
        map[i] = clamp_u8(255.0 * num / den);
    }

    for y in y0..y1 {
        for x in x0..x1 {
            let px = img.get_pixel_mut(x, y);
            let l = luma(px);
            if l == 0 {
                continue;
            }
            let ratio = map[l as usize] as f64 / l as f64;
            for c in 0..3 {
                px[c] = clamp_u8(px[c] as f64 * ratio);
            }
        }
    }
}

// Tests
