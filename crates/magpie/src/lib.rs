//! # magpie
//!
//! Labeled image dataset preparation for supervised classification.
//!
//! This crate provides:
//! - [`FolderIndex`] — class-per-subdirectory dataset indexing with a
//!   bijective name↔label mapping
//! - [`plan_split`] — seeded stratified train/val/test partitioning
//! - [`Pipeline`] — two-mode (train/eval) image transform pipeline with
//!   explicit-rng augmentation
//! - [`BatchLoader`] — shuffled, optionally worker-prefetched batch
//!   iteration
//! - [`channel_stats`] — per-channel normalization statistics
//! - [`denormalize`] — inverse normalization for visualization tools
//!
//! The usual wiring: scan a folder tree, plan a split over its labels, build
//! one train-mode and one eval-mode pipeline, then bind three loaders to the
//! split's subsets.

pub mod augment;
pub mod dataset;
pub mod error;
pub mod loader;
mod prefetch;
pub mod split;
pub mod stats;
pub mod transform;

pub use augment::{
    Affine, Augment, BrightnessContrast, ChannelShift, Equalize, GammaJitter, GaussianNoise,
    HorizontalFlip, Rotate90,
};
pub use dataset::{ClassLabel, ClassMap, Entry, FolderIndex};
pub use error::{Error, Result};
pub use loader::{Batch, BatchLoader, EpochIter, LoaderConfig};
pub use split::{plan_split, SplitFractions, SplitPlan};
pub use stats::{channel_stats, ChannelStats};
pub use transform::{denormalize, Mode, Pipeline, PipelineBuilder, Tensor};
