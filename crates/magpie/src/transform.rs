// Transform pipeline — raw image bytes to fixed-shape normalized tensors
//
// A pipeline is a pure function of (input bytes, explicit rng). Stage order
// is fixed:
//
//   decode → [train only: augment] → resize → scale to [0,1] → normalize
//
// Eval mode never runs the augmentation stage, so its output for a given
// input is bit-for-bit deterministic across calls. Both modes resize with
// the same interpolation filter; resizing train and eval data differently
// would skew the two distributions against each other.

use std::fmt;
use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;
use rand::RngCore;

use crate::augment::Augment;
use crate::bail;
use crate::error::{Error, Result};

// Tensor

/// A dense row-major f32 array with an explicit shape.
///
/// Pipeline output is `[3, H, W]`; collated batches are `[B, 3, H, W]`.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Build a tensor, checking that `data` fills `shape` exactly.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            bail!(
                "tensor data length {} does not fill shape {:?} ({} elements)",
                data.len(),
                shape,
                expected
            );
        }
        Ok(Self { data, shape })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn into_data(self) -> Vec<f32> {
        self.data
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("numel", &self.data.len())
            .finish()
    }
}

// Mode

/// Selects whether the stochastic augmentation stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Augment, then resize and normalize. Output varies per call unless the
    /// caller fixes the rng seed.
    Train,
    /// Resize and normalize only. Deterministic.
    Eval,
}

// Pipeline

/// A two-mode image transform pipeline.
///
/// Built with [`Pipeline::builder`]. The pipeline is immutable and
/// `Send + Sync`, so one instance is shared by all loader workers.
pub struct Pipeline {
    mode: Mode,
    height: u32,
    width: u32,
    mean: [f32; 3],
    std: [f32; 3],
    augments: Vec<Box<dyn Augment>>,
}

impl Pipeline {
    /// Start building a pipeline for the given mode.
    pub fn builder(mode: Mode) -> PipelineBuilder {
        PipelineBuilder {
            mode,
            height: 224,
            width: 224,
            mean: [0.5; 3],
            std: [0.5; 3],
            augments: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Output shape of a single item: `[3, H, W]`.
    pub fn output_shape(&self) -> [usize; 3] {
        [3, self.height as usize, self.width as usize]
    }

    pub fn mean(&self) -> [f32; 3] {
        self.mean
    }

    pub fn std(&self) -> [f32; 3] {
        self.std
    }

    /// Transform raw encoded bytes into a `[3, H, W]` tensor.
    ///
    /// `origin` names the source in decode errors. Eval mode ignores `rng`.
    pub fn apply_bytes(
        &self,
        bytes: &[u8],
        origin: &Path,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::Decode {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut rgb = img.to_rgb8();

        if self.mode == Mode::Train {
            for op in &self.augments {
                rgb = op.apply(rgb, rng);
            }
        }

        let resized = image::imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
        Ok(self.pack(&resized))
    }

    /// Read a file and transform it. The path is carried into any error.
    pub fn apply_path(&self, path: &Path, rng: &mut dyn RngCore) -> Result<Tensor> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        self.apply_bytes(&bytes, path, rng)
    }

    /// Interleaved u8 RGB → scaled, normalized, planar CHW f32.
    fn pack(&self, img: &RgbImage) -> Tensor {
        let (w, h) = (self.width as usize, self.height as usize);
        let npix = w * h;
        let raw = img.as_raw();
        let mut data = vec![0f32; 3 * npix];
        for c in 0..3 {
            let (mean, std) = (self.mean[c], self.std[c]);
            let plane = &mut data[c * npix..(c + 1) * npix];
            for (i, v) in plane.iter_mut().enumerate() {
                *v = (raw[i * 3 + c] as f32 / 255.0 - mean) / std;
            }
        }
        Tensor {
            data,
            shape: vec![3, h, w],
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("mode", &self.mode)
            .field("size", &(self.height, self.width))
            .field("augments", &self.augments.len())
            .finish()
    }
}

// PipelineBuilder

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    mode: Mode,
    height: u32,
    width: u32,
    mean: [f32; 3],
    std: [f32; 3],
    augments: Vec<Box<dyn Augment>>,
}

impl PipelineBuilder {
    /// Target spatial size (height, width). Default 224×224.
    pub fn size(mut self, height: u32, width: u32) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    /// Per-channel normalization statistics. Defaults map [0,1] to [-1,1].
    pub fn normalize(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    /// Append an augmentation op. Ops run in insertion order, and only in
    /// [`Mode::Train`].
    pub fn augment(mut self, op: Box<dyn Augment>) -> Self {
        self.augments.push(op);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Pipeline> {
        if self.height == 0 || self.width == 0 {
            bail!("target size must be non-zero, got {}x{}", self.height, self.width);
        }
        if self.std.iter().any(|&s| s <= 0.0) {
            bail!("std must be positive per channel, got {:?}", self.std);
        }
        Ok(Pipeline {
            mode: self.mode,
            height: self.height,
            width: self.width,
            mean: self.mean,
            std: self.std,
            augments: self.augments,
        })
    }
}

// Denormalization

/// Invert per-channel normalization, returning interleaved RGB bytes in
/// [0,255].
///
/// This is the only interface an external visualization tool needs: a pure
/// function of `(tensor, mean, std)`. The tensor must be a `[3, H, W]` item
/// tensor as produced by [`Pipeline::apply_bytes`].
pub fn denormalize(tensor: &Tensor, mean: [f32; 3], std: [f32; 3]) -> Result<Vec<u8>> {
    let shape = tensor.shape();
    if shape.len() != 3 || shape[0] != 3 {
        return Err(Error::BadShape {
            expected: "[3, H, W]",
            got: shape.to_vec(),
        });
    }
    let npix = shape[1] * shape[2];
    let data = tensor.data();
    let mut out = vec![0u8; 3 * npix];
    for c in 0..3 {
        let plane = &data[c * npix..(c + 1) * npix];
        for (i, &v) in plane.iter().enumerate() {
            let pixel = (v * std[c] + mean[c]) * 255.0;
            out[i * 3 + c] = pixel.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

// Tests
