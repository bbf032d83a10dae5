// inspect — scan a folder dataset, plan a split, and run one epoch per subset
//
// Expects the usual class-per-subdirectory layout:
//
//   root/
//     class_a/ img_001.jpg ...
//     class_b/ img_042.png ...
//
// Usage:
//   cargo run -p inspect-demo -- --root data/PlantVillage
//   cargo run -p inspect-demo -- --root data/flowers --size 128 --workers 4
//   cargo run -p inspect-demo -- --root data/flowers --stats   # derive mean/std

use std::sync::Arc;
use std::time::Instant;

use magpie::{
    channel_stats, plan_split, Affine, BatchLoader, BrightnessContrast, FolderIndex, GammaJitter,
    HorizontalFlip, LoaderConfig, Mode, Pipeline, SplitFractions,
};

// Configuration

struct Config {
    root: Option<String>,
    size: u32,
    batch_size: usize,
    workers: usize,
    seed: u64,
    fractions: (f64, f64, f64),
    stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            size: 224,
            batch_size: 32,
            workers: 0,
            seed: 42,
            fractions: (0.7, 0.15, 0.15),
            stats: false,
        }
    }
}

fn parse_args() -> Config {
    let mut cfg = Config::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--root" => {
                i += 1;
                cfg.root = Some(args[i].clone());
            }
            "--size" => {
                i += 1;
                cfg.size = args[i].parse().expect("invalid --size");
            }
            "--batch-size" => {
                i += 1;
                cfg.batch_size = args[i].parse().expect("invalid --batch-size");
            }
            "--workers" => {
                i += 1;
                cfg.workers = args[i].parse().expect("invalid --workers");
            }
            "--seed" => {
                i += 1;
                cfg.seed = args[i].parse().expect("invalid --seed");
            }
            "--fractions" => {
                i += 1;
                let parts: Vec<f64> = args[i]
                    .split(',')
                    .map(|p| p.parse().expect("invalid --fractions"))
                    .collect();
                assert_eq!(parts.len(), 3, "--fractions wants train,val,test");
                cfg.fractions = (parts[0], parts[1], parts[2]);
            }
            "--stats" => {
                cfg.stats = true;
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
        i += 1;
    }
    cfg
}

fn main() {
    let cfg = parse_args();
    let Some(root) = cfg.root.as_deref() else {
        eprintln!("usage: inspect --root <dataset-dir> [--size N] [--batch-size N] [--workers N] [--seed N] [--fractions a,b,c] [--stats]");
        std::process::exit(2);
    };

    if let Err(e) = run(root, &cfg) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(root: &str, cfg: &Config) -> magpie::Result<()> {
    let t0 = Instant::now();
    let index = Arc::new(FolderIndex::scan(root)?);
    println!(
        "indexed {} images across {} classes in {:.1?}",
        index.len(),
        index.class_count(),
        t0.elapsed()
    );
    for (label, size) in index.class_sizes().iter().enumerate() {
        println!("  [{label:>3}] {:<30} {size}", index.class_name(label as u32)?);
    }
    for name in index.skipped_classes() {
        println!("  (skipped empty class directory {name:?})");
    }

    let (ftrain, fval, ftest) = cfg.fractions;
    let fractions = SplitFractions::new(ftrain, fval, ftest)?;
    let plan = plan_split(&index.labels(), &fractions, cfg.seed)?;
    println!(
        "split: {} train / {} val / {} test (seed {})",
        plan.train.len(),
        plan.val.len(),
        plan.test.len(),
        cfg.seed
    );

    let (mut mean, mut std) = ([0.5; 3], [0.5; 3]);
    if cfg.stats {
        let t = Instant::now();
        let stats = channel_stats(&index, &plan.train, (cfg.size, cfg.size))?;
        println!(
            "train-set channel stats in {:.1?}: mean {:?} std {:?}",
            t.elapsed(),
            stats.mean,
            stats.std
        );
        (mean, std) = (stats.mean, stats.std);
    }

    let train_pipeline = Arc::new(
        Pipeline::builder(Mode::Train)
            .size(cfg.size, cfg.size)
            .normalize(mean, std)
            .augment(Box::new(HorizontalFlip::new(0.5)))
            .augment(Box::new(Affine::new(0.3)))
            .augment(Box::new(BrightnessContrast::new(0.3)))
            .augment(Box::new(GammaJitter::new(0.2)))
            .build()?,
    );
    let eval_pipeline = Arc::new(
        Pipeline::builder(Mode::Eval)
            .size(cfg.size, cfg.size)
            .normalize(mean, std)
            .build()?,
    );

    let subsets = [
        ("train", plan.train, Arc::clone(&train_pipeline), true),
        ("val", plan.val, Arc::clone(&eval_pipeline), false),
        ("test", plan.test, Arc::clone(&eval_pipeline), false),
    ];

    for (name, subset, pipeline, shuffle) in subsets {
        if subset.is_empty() {
            println!("{name}: empty subset, skipping");
            continue;
        }
        let loader = BatchLoader::new(
            Arc::clone(&index),
            subset,
            pipeline,
            LoaderConfig::default()
                .batch_size(cfg.batch_size)
                .shuffle(shuffle)
                .num_workers(cfg.workers)
                .seed(cfg.seed),
        )?;

        let t = Instant::now();
        let mut batches = 0usize;
        let mut items = 0usize;
        for batch in loader.iter_epoch(0) {
            let batch = batch?;
            batches += 1;
            items += batch.len();
        }
        let dt = t.elapsed();
        println!(
            "{name}: {items} items in {batches} batches, {:.1?} ({:.1} img/s)",
            dt,
            items as f64 / dt.as_secs_f64()
        );
    }

    Ok(())
}
