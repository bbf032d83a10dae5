// Tests for magpie: FolderIndex, split planning, transforms, BatchLoader
//
// Fixture trees are built on disk with tempfile and real encoded images, so
// these tests exercise the same decode path production data takes.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use magpie::{
    denormalize, plan_split, BatchLoader, BrightnessContrast, Error, FolderIndex, GaussianNoise,
    HorizontalFlip, LoaderConfig, Mode, Pipeline, SplitFractions,
};

// Fixture helpers

fn write_image(path: &Path, tint: u8) {
    let img = RgbImage::from_fn(12, 9, |x, y| {
        Rgb([tint, (x * 20 % 256) as u8, (y * 25 % 256) as u8])
    });
    img.save(path).unwrap();
}

/// Build `root/<class>/img_XXX.png` for each (class, count) pair.
fn build_tree(classes: &[(&str, usize)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (ci, (name, count)) in classes.iter().enumerate() {
        let class_dir = dir.path().join(name);
        fs::create_dir(&class_dir).unwrap();
        for i in 0..*count {
            write_image(
                &class_dir.join(format!("img_{i:03}.png")),
                (ci * 50 + i * 3) as u8,
            );
        }
    }
    dir
}

fn eval_pipeline(size: u32) -> Arc<Pipeline> {
    Arc::new(Pipeline::builder(Mode::Eval).size(size, size).build().unwrap())
}

// FolderIndex

#[test]
fn index_counts_only_allowlisted_files() {
    let dir = build_tree(&[("daisy", 3), ("tulip", 2)]);
    // Mixed extensions in daisy
    write_image(&dir.path().join("daisy/extra.bmp"), 7);
    write_image(&dir.path().join("daisy/photo.JPG"), 9);
    // Distractors: wrong extension, loose file at root, hidden dir, nested dir
    fs::write(dir.path().join("daisy/notes.txt"), "not an image").unwrap();
    write_image(&dir.path().join("loose.png"), 1);
    fs::create_dir(dir.path().join(".cache")).unwrap();
    write_image(&dir.path().join(".cache").join("cached.png"), 2);
    fs::create_dir(dir.path().join("daisy/nested")).unwrap();
    write_image(&dir.path().join("daisy/nested/deep.png"), 3);

    let index = FolderIndex::scan(dir.path()).unwrap();
    assert_eq!(index.class_count(), 2);
    assert_eq!(index.len(), 7); // 3+2 png, 1 bmp, 1 JPG
    assert_eq!(index.class_sizes(), &[5, 2]);
    assert!(index.skipped_classes().is_empty());
}

#[test]
fn class_mappings_are_mutual_inverses() {
    let dir = build_tree(&[("pear", 3), ("apple", 3), ("quince", 3)]);
    let index = FolderIndex::scan(dir.path()).unwrap();
    // Sorted lexicographically: apple < pear < quince
    assert_eq!(index.class_name(0).unwrap(), "apple");
    assert_eq!(index.class_name(2).unwrap(), "quince");
    for label in 0..index.class_count() as u32 {
        let name = index.class_name(label).unwrap();
        assert_eq!(index.class_index(name).unwrap(), label);
    }
    assert!(matches!(
        index.class_index("kumquat").unwrap_err(),
        Error::UnknownClassName(_)
    ));
}

#[test]
fn entries_carry_their_directory_label() {
    let dir = build_tree(&[("cat", 4), ("dog", 4)]);
    let index = FolderIndex::scan(dir.path()).unwrap();
    for entry in index.entries() {
        let parent = entry.path.parent().unwrap().file_name().unwrap();
        let expected = index.class_index(parent.to_str().unwrap()).unwrap();
        assert_eq!(entry.label, expected);
    }
}

#[test]
fn empty_class_directory_is_dropped_and_reported() {
    let dir = build_tree(&[("ant", 3), ("bee", 3)]);
    fs::create_dir(dir.path().join("hollow")).unwrap();
    fs::write(dir.path().join("hollow/readme.md"), "no images here").unwrap();

    let index = FolderIndex::scan(dir.path()).unwrap();
    assert_eq!(index.class_count(), 2);
    assert_eq!(index.skipped_classes(), &["hollow".to_string()]);
    // Labels stay contiguous over the surviving classes
    assert_eq!(index.class_name(0).unwrap(), "ant");
    assert_eq!(index.class_name(1).unwrap(), "bee");
}

#[test]
fn scan_fails_loudly_on_misconfiguration() {
    assert!(matches!(
        FolderIndex::scan("/definitely/not/a/real/path").unwrap_err(),
        Error::NotADirectory(_)
    ));

    let empty = tempfile::tempdir().unwrap();
    assert!(matches!(
        FolderIndex::scan(empty.path()).unwrap_err(),
        Error::EmptyDataset { .. }
    ));

    let hollow = tempfile::tempdir().unwrap();
    fs::create_dir(hollow.path().join("a")).unwrap();
    fs::create_dir(hollow.path().join("b")).unwrap();
    assert!(matches!(
        FolderIndex::scan(hollow.path()).unwrap_err(),
        Error::EmptyDataset { .. }
    ));
}

#[test]
fn get_out_of_range_is_an_error_not_garbage() {
    let dir = build_tree(&[("only", 3)]);
    let index = FolderIndex::scan(dir.path()).unwrap();
    assert!(index.get(2).is_ok());
    assert!(matches!(
        index.get(3).unwrap_err(),
        Error::IndexOutOfRange { index: 3, len: 3 }
    ));
}

// Split planning on a scanned index

#[test]
fn stratified_split_on_scanned_index() {
    let dir = build_tree(&[("a", 5), ("b", 5)]);
    let index = FolderIndex::scan(dir.path()).unwrap();
    let fractions = SplitFractions::new(0.6, 0.2, 0.2).unwrap();
    let labels = index.labels();

    let plan = plan_split(&labels, &fractions, 42).unwrap();
    assert_eq!(plan.train.len(), 6);
    assert_eq!(plan.val.len(), 2);
    assert_eq!(plan.test.len(), 2);
    assert!(plan.is_partition(index.len()));

    // Each subset holds both classes in equal shares
    for subset in [&plan.train, &plan.val, &plan.test] {
        let a = subset.iter().filter(|&&i| labels[i] == 0).count();
        assert_eq!(a * 2, subset.len());
    }

    // Determinism law
    assert_eq!(plan, plan_split(&labels, &fractions, 42).unwrap());
    assert_ne!(plan, plan_split(&labels, &fractions, 43).unwrap());
}

// Batch loading

#[test]
fn epoch_yields_8_8_7_for_23_items() {
    let dir = build_tree(&[("x", 23)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let loader = BatchLoader::over_all(
        Arc::clone(&index),
        eval_pipeline(8),
        LoaderConfig::default().batch_size(8).shuffle(false),
    )
    .unwrap();

    assert_eq!(loader.num_batches(), 3);
    let sizes: Vec<usize> = loader
        .iter_epoch(0)
        .map(|b| b.unwrap().len())
        .collect();
    assert_eq!(sizes, vec![8, 8, 7]);

    // Partition law: every item exactly once
    let mut seen: Vec<usize> = loader
        .iter_epoch(0)
        .flat_map(|b| b.unwrap().indices)
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..23).collect::<Vec<_>>());
}

#[test]
fn drop_last_discards_the_short_batch() {
    let dir = build_tree(&[("x", 23)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let loader = BatchLoader::over_all(
        index,
        eval_pipeline(8),
        LoaderConfig::default()
            .batch_size(8)
            .shuffle(false)
            .drop_last(true),
    )
    .unwrap();
    assert_eq!(loader.num_batches(), 2);
    let sizes: Vec<usize> = loader.iter_epoch(0).map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![8, 8]);
}

#[test]
fn batch_tensors_are_stacked_with_matching_labels() {
    let dir = build_tree(&[("left", 3), ("right", 3)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let loader = BatchLoader::over_all(
        Arc::clone(&index),
        eval_pipeline(6),
        LoaderConfig::default().batch_size(4).shuffle(false),
    )
    .unwrap();

    let batches: Vec<_> = loader.iter_epoch(0).map(|b| b.unwrap()).collect();
    assert_eq!(batches[0].images.shape(), &[4, 3, 6, 6]);
    assert_eq!(batches[1].images.shape(), &[2, 3, 6, 6]);
    for batch in &batches {
        for (row, &pos) in batch.indices.iter().enumerate() {
            assert_eq!(batch.labels[row], index.get(pos).unwrap().label);
        }
    }
}

#[test]
fn shuffle_reorders_across_epochs_and_replays_within_one() {
    let dir = build_tree(&[("x", 16)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let loader = BatchLoader::over_all(
        index,
        eval_pipeline(6),
        LoaderConfig::default().batch_size(16).shuffle(true).seed(9),
    )
    .unwrap();

    let order = |epoch: u64| -> Vec<usize> {
        loader
            .iter_epoch(epoch)
            .flat_map(|b| b.unwrap().indices)
            .collect()
    };

    assert_eq!(order(0), order(0)); // same epoch replays identically
    assert_ne!(order(0), order(1)); // consecutive epochs re-permute
    let mut sorted = order(1);
    sorted.sort_unstable();
    assert_eq!(sorted, (0..16).collect::<Vec<_>>());
}

#[test]
fn no_shuffle_keeps_subset_order_every_epoch() {
    let dir = build_tree(&[("x", 10)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let subset = vec![7, 2, 9, 0, 4];
    let loader = BatchLoader::new(
        index,
        subset.clone(),
        eval_pipeline(6),
        LoaderConfig::default().batch_size(2).shuffle(false),
    )
    .unwrap();

    for epoch in 0..3 {
        let seen: Vec<usize> = loader
            .iter_epoch(epoch)
            .flat_map(|b| b.unwrap().indices)
            .collect();
        assert_eq!(seen, subset);
    }
}

#[test]
fn prefetch_workers_match_sequential_exactly() {
    let dir = build_tree(&[("a", 9), ("b", 8)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    // Train-mode pipeline: augmentation draws must also be identical
    let pipeline = Arc::new(
        Pipeline::builder(Mode::Train)
            .size(8, 8)
            .augment(Box::new(HorizontalFlip::new(0.5)))
            .augment(Box::new(BrightnessContrast::new(0.5)))
            .augment(Box::new(GaussianNoise::new(0.5)))
            .build()
            .unwrap(),
    );

    let run = |workers: usize| -> Vec<(Vec<usize>, Vec<u32>, Vec<f32>)> {
        let loader = BatchLoader::over_all(
            Arc::clone(&index),
            Arc::clone(&pipeline),
            LoaderConfig::default()
                .batch_size(4)
                .shuffle(true)
                .seed(21)
                .num_workers(workers),
        )
        .unwrap();
        loader
            .iter_epoch(3)
            .map(|b| {
                let b = b.unwrap();
                (b.indices, b.labels, b.images.data().to_vec())
            })
            .collect()
    };

    let sequential = run(0);
    let prefetched = run(3);
    assert_eq!(sequential.len(), prefetched.len());
    for (s, p) in sequential.iter().zip(&prefetched) {
        assert_eq!(s.0, p.0, "batch order must follow traversal order");
        assert_eq!(s.1, p.1);
        assert_eq!(s.2, p.2, "worker scheduling must not change tensors");
    }
}

#[test]
fn abandoning_a_prefetch_epoch_releases_workers() {
    let dir = build_tree(&[("a", 12)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let loader = BatchLoader::over_all(
        index,
        eval_pipeline(8),
        LoaderConfig::default().batch_size(2).num_workers(3),
    )
    .unwrap();

    let mut iter = loader.iter_epoch(0);
    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.len(), 2);
    drop(iter); // joins workers; the test hangs here if any leak

    // The loader is reusable after an abandoned epoch
    assert_eq!(loader.iter_epoch(1).count(), 6);
}

#[test]
fn corrupt_file_aborts_its_batch_and_names_the_path() {
    let dir = build_tree(&[("a", 6)]);
    let bad_path = dir.path().join("a/img_002.png");
    fs::write(&bad_path, b"these bytes are not a png").unwrap();
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());

    for workers in [0, 2] {
        let loader = BatchLoader::over_all(
            Arc::clone(&index),
            eval_pipeline(8),
            LoaderConfig::default()
                .batch_size(2)
                .shuffle(false)
                .num_workers(workers),
        )
        .unwrap();

        let results: Vec<_> = loader.iter_epoch(0).collect();
        assert_eq!(results.len(), 3);
        // Entries are path-sorted, so img_002 lands in the second batch
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        match results[1].as_ref().unwrap_err() {
            Error::Decode { path, .. } => assert_eq!(path, &bad_path),
            other => panic!("expected Decode error, got {other:?}"),
        }
    }
}

#[test]
fn loader_rejects_bad_construction() {
    let dir = build_tree(&[("a", 4)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());

    let err = BatchLoader::over_all(
        Arc::clone(&index),
        eval_pipeline(8),
        LoaderConfig::default().batch_size(0),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidBatchSize));

    let err = BatchLoader::new(
        index,
        vec![0, 99],
        eval_pipeline(8),
        LoaderConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidSubsetIndex { index: 99, len: 4 }));
}

// End-to-end: split feeds loaders, eval tensors round-trip to pixels

#[test]
fn full_preparation_flow() {
    let dir = build_tree(&[("healthy", 8), ("blight", 6), ("rust", 4)]);
    let index = Arc::new(FolderIndex::scan(dir.path()).unwrap());
    let fractions = SplitFractions::new(0.5, 0.25, 0.25).unwrap();
    let plan = plan_split(&index.labels(), &fractions, 7).unwrap();
    assert!(plan.is_partition(index.len()));

    let mean = [0.5; 3];
    let std = [0.25; 3];
    let eval = Arc::new(
        Pipeline::builder(Mode::Eval)
            .size(8, 8)
            .normalize(mean, std)
            .build()
            .unwrap(),
    );

    let mut total = 0usize;
    for subset in [plan.train.clone(), plan.val.clone(), plan.test.clone()] {
        let loader = BatchLoader::new(
            Arc::clone(&index),
            subset,
            Arc::clone(&eval),
            LoaderConfig::default().batch_size(4).shuffle(false),
        )
        .unwrap();
        for batch in loader.iter_epoch(0) {
            total += batch.unwrap().len();
        }
    }
    assert_eq!(total, index.len());

    // A single eval tensor de-normalizes back into byte range
    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(0);
    let tensor = eval
        .apply_path(&index.get(0).unwrap().path, &mut rng)
        .unwrap();
    let rgb = denormalize(&tensor, mean, std).unwrap();
    assert_eq!(rgb.len(), 3 * 8 * 8);
}
