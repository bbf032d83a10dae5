// Channel statistics — derive normalization constants from the data itself
//
// The transform pipeline normalizes with caller-supplied per-channel
// mean/std. When no published statistics fit the dataset, compute them from
// the training subset (and only the training subset — folding val/test
// pixels into the statistics leaks information across the split).

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::bail;
use crate::dataset::FolderIndex;
use crate::error::Result;
use crate::transform::{Mode, Pipeline};

/// Per-channel mean and standard deviation over [0,1]-scaled pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Compute per-channel statistics over the entries at `subset` positions,
/// decoded and resized to `size` (height, width).
///
/// Decoding fans out across the rayon pool; any unreadable file fails the
/// whole computation with its path.
pub fn channel_stats(
    index: &FolderIndex,
    subset: &[usize],
    size: (u32, u32),
) -> Result<ChannelStats> {
    if subset.is_empty() {
        bail!("cannot compute channel statistics over an empty subset");
    }
    // Identity normalization: the pipeline output is the [0,1]-scaled pixels
    let pipeline = Pipeline::builder(Mode::Eval)
        .size(size.0, size.1)
        .normalize([0.0; 3], [1.0; 3])
        .build()?;
    let npix = (size.0 as usize) * (size.1 as usize);

    let (sum, sumsq) = subset
        .par_iter()
        .map(|&pos| -> Result<([f64; 3], [f64; 3])> {
            let entry = index.get(pos)?;
            // Eval mode draws no randomness; the rng is just the signature
            let mut rng = StdRng::seed_from_u64(0);
            let tensor = pipeline.apply_path(&entry.path, &mut rng)?;
            let data = tensor.data();
            let mut sum = [0.0f64; 3];
            let mut sumsq = [0.0f64; 3];
            for c in 0..3 {
                for &v in &data[c * npix..(c + 1) * npix] {
                    let v = v as f64;
                    sum[c] += v;
                    sumsq[c] += v * v;
                }
            }
            Ok((sum, sumsq))
        })
        .try_reduce(
            || ([0.0; 3], [0.0; 3]),
            |a, b| {
                let mut sum = a.0;
                let mut sumsq = a.1;
                for c in 0..3 {
                    sum[c] += b.0[c];
                    sumsq[c] += b.1[c];
                }
                Ok((sum, sumsq))
            },
        )?;

    let n = (subset.len() * npix) as f64;
    let mut mean = [0.0f32; 3];
    let mut std = [0.0f32; 3];
    for c in 0..3 {
        let m = sum[c] / n;
        let var = (sumsq[c] / n - m * m).max(1e-12);
        mean[c] = m as f32;
        std[c] = var.sqrt() as f32;
    }
    Ok(ChannelStats { mean, std })
}
