// Stratified split planning — train/val/test index partitioning
//
// Entry indices are grouped by class and each class is partitioned
// independently: shuffle the class's indices with a seeded rng, cut
// round(count·train) for train and round(count·val) for val, and give the
// rounding remainder to test. Partitioning class-wise is what preserves
// per-class proportions on imbalanced datasets; a global shuffle-then-cut
// would not.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::ClassLabel;
use crate::error::{Error, Result};

/// Target fractions for the three subsets. Validated at construction:
/// non-negative and summing to 1 within floating tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitFractions {
    train: f64,
    val: f64,
    test: f64,
}

impl SplitFractions {
    /// Validate and build. Fails with [`Error::InvalidFractions`] if any
    /// fraction is negative or the sum is not ~1.0.
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidFractions {
            train,
            val,
            test,
            reason: reason.to_string(),
        };
        if train < 0.0 || val < 0.0 || test < 0.0 {
            return Err(invalid("fractions must be non-negative"));
        }
        let sum = train + val + test;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(invalid("fractions must sum to 1.0"));
        }
        Ok(Self { train, val, test })
    }

    pub fn train(&self) -> f64 {
        self.train
    }

    pub fn val(&self) -> f64 {
        self.val
    }

    pub fn test(&self) -> f64 {
        self.test
    }
}

/// Three disjoint sets of entry indices whose union is exactly
/// `0..total` — no entry omitted, none duplicated.
///
/// Within each subset, indices appear as the concatenation of per-class runs
/// in label order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitPlan {
    /// Total number of planned indices.
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Whether the plan covers no indices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the partition law: the three subsets are disjoint and cover
    /// `0..total` exactly once.
    pub fn is_partition(&self, total: usize) -> bool {
        if self.len() != total {
            return false;
        }
        let mut seen = vec![false; total];
        for &i in self.train.iter().chain(&self.val).chain(&self.test) {
            if i >= total || seen[i] {
                return false;
            }
            seen[i] = true;
        }
        true
    }
}

/// Derive the per-class shuffle seed so each class's permutation is
/// independent of every other class's size.
fn class_seed(seed: u64, label: ClassLabel) -> u64 {
    mix64(seed ^ (label as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

/// splitmix64 finalizer.
pub(crate) fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x
}

/// Plan a stratified train/val/test split of `labels`.
///
/// `labels[i]` is the class of entry `i` (for a scanned index, pass
/// [`FolderIndex::labels`](crate::dataset::FolderIndex::labels)). Identical
/// `(labels, fractions, seed)` always produce an identical plan.
///
/// Fails with [`Error::InsufficientSamples`] if any class has fewer than 3
/// members: such a class cannot populate all three subsets, and guessing a
/// fallback allocation here would silently skew whichever subset won. Filter
/// tiny classes out before planning if they are expendable.
pub fn plan_split(
    labels: &[ClassLabel],
    fractions: &SplitFractions,
    seed: u64,
) -> Result<SplitPlan> {
    // Group entry indices by class, preserving index order within a class.
    let class_count = labels.iter().map(|&l| l as usize + 1).max().unwrap_or(0);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); class_count];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label as usize].push(i);
    }

    let mut plan = SplitPlan {
        train: Vec::new(),
        val: Vec::new(),
        test: Vec::new(),
    };

    for (label, indices) in by_class.iter_mut().enumerate() {
        let count = indices.len();
        if count < 3 {
            return Err(Error::InsufficientSamples {
                label: label as ClassLabel,
                count,
            });
        }

        let mut rng = StdRng::seed_from_u64(class_seed(seed, label as ClassLabel));
        indices.shuffle(&mut rng);

        // Cut train then val; the rounding remainder lands in test so the
        // three runs exactly partition the class.
        let n_train = (count as f64 * fractions.train).round() as usize;
        let n_train = n_train.min(count);
        let n_val = (count as f64 * fractions.val).round() as usize;
        let n_val = n_val.min(count - n_train);

        plan.train.extend_from_slice(&indices[..n_train]);
        plan.val.extend_from_slice(&indices[n_train..n_train + n_val]);
        plan.test.extend_from_slice(&indices[n_train + n_val..]);
    }

    Ok(plan)
}
