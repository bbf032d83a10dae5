// FolderIndex — directory-backed image classification index
//
// Scans a directory structure where each subdirectory is a class:
//
//   root/
//     class_a/
//       img_001.png
//       img_002.jpg
//     class_b/
//       img_003.png
//       ...
//
// Class labels are assigned as sorted indices of subdirectory names, so the
// same tree always produces the same label mapping. The index stores
// (path, label) entries only; pixels are read later by the transform
// pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Supported image extensions (case-insensitive).
const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// Integer class label in `[0, class_count)`.
pub type ClassLabel = u32;

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// Entry

/// One (file path, class label) record. Its identity is its position in the
/// owning [`FolderIndex`]; that position is the handle split planning and
/// batching work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub label: ClassLabel,
}

// ClassMap

/// Bijective mapping between class names and integer labels.
///
/// Built once when the index is scanned and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ClassMap {
    names: Vec<String>,
    index_of: HashMap<String, ClassLabel>,
}

impl ClassMap {
    fn from_sorted_names(names: Vec<String>) -> Self {
        let index_of = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as ClassLabel))
            .collect();
        Self { names, index_of }
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no classes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Class name for a label.
    pub fn name(&self, label: ClassLabel) -> Result<&str> {
        self.names
            .get(label as usize)
            .map(String::as_str)
            .ok_or(Error::UnknownClassIndex {
                index: label,
                count: self.names.len() as u32,
            })
    }

    /// Label for a class name.
    pub fn index(&self, name: &str) -> Result<ClassLabel> {
        self.index_of
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownClassName(name.to_string()))
    }

    /// All class names, in label order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

// FolderIndex

/// An immutable index of a class-per-subdirectory image dataset.
///
/// Constructed once by [`FolderIndex::scan`]; read-only thereafter. Entry
/// order is deterministic: classes sorted lexicographically, paths sorted
/// within each class.
#[derive(Debug)]
pub struct FolderIndex {
    root: PathBuf,
    classes: ClassMap,
    entries: Vec<Entry>,
    class_sizes: Vec<usize>,
    skipped: Vec<String>,
}

impl FolderIndex {
    /// Scan `root` and build the index.
    ///
    /// Immediate subdirectories become classes; hidden directories (leading
    /// `.`) and loose files under the root are ignored. Within a class, only
    /// files with an allow-listed image extension are collected — other files
    /// are skipped silently, while a class directory with no images at all is
    /// dropped before labels are assigned and recorded in
    /// [`skipped_classes`](Self::skipped_classes). Dropping keeps labels
    /// contiguous, and an empty class could never be stratified anyway.
    ///
    /// Fails with [`Error::EmptyDataset`] if no classes or no images survive
    /// the scan — a silently empty dataset is a misconfiguration.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::NotADirectory(root));
        }

        // Collect class subdirectories (sorted for stable labels)
        let mut class_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(|e| Error::io(&root, e))? {
            let entry = entry.map_err(|e| Error::io(&root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !name.starts_with('.') {
                    class_dirs.push((name.to_string(), path));
                }
            }
        }
        class_dirs.sort_by(|a, b| a.0.cmp(&b.0));

        if class_dirs.is_empty() {
            return Err(Error::EmptyDataset {
                root,
                reason: "no class subdirectories".to_string(),
            });
        }

        // Collect image paths per class, dropping classes with no images
        let mut names: Vec<String> = Vec::new();
        let mut entries: Vec<Entry> = Vec::new();
        let mut class_sizes: Vec<usize> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();

        for (name, dir) in class_dirs {
            let mut paths: Vec<PathBuf> = Vec::new();
            for entry in std::fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))? {
                let entry = entry.map_err(|e| Error::io(&dir, e))?;
                let path = entry.path();
                if path.is_file() && is_image(&path) {
                    paths.push(path);
                }
            }
            if paths.is_empty() {
                skipped.push(name);
                continue;
            }
            paths.sort();

            let label = names.len() as ClassLabel;
            class_sizes.push(paths.len());
            entries.extend(paths.into_iter().map(|path| Entry { path, label }));
            names.push(name);
        }

        if entries.is_empty() {
            return Err(Error::EmptyDataset {
                root,
                reason: "no image files in any class subdirectory".to_string(),
            });
        }

        Ok(Self {
            root,
            classes: ClassMap::from_sorted_names(names),
            entries,
            class_sizes,
            skipped,
        })
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries. Always false for a scanned index;
    /// scanning an empty tree fails instead.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at position `i`.
    pub fn get(&self, i: usize) -> Result<&Entry> {
        self.entries.get(i).ok_or(Error::IndexOutOfRange {
            index: i,
            len: self.entries.len(),
        })
    }

    /// All entries, in index order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The label of every entry, in index order.
    pub fn labels(&self) -> Vec<ClassLabel> {
        self.entries.iter().map(|e| e.label).collect()
    }

    /// Number of classes that survived the scan.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Class name for a label.
    pub fn class_name(&self, label: ClassLabel) -> Result<&str> {
        self.classes.name(label)
    }

    /// Label for a class name.
    pub fn class_index(&self, name: &str) -> Result<ClassLabel> {
        self.classes.index(name)
    }

    /// The name↔label mapping.
    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    /// Entry count per class, in label order.
    pub fn class_sizes(&self) -> &[usize] {
        &self.class_sizes
    }

    /// Names of class directories dropped because they held no images.
    pub fn skipped_classes(&self) -> &[String] {
        &self.skipped
    }

    /// The scanned root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
