use std::path::PathBuf;

/// All errors that can occur while preparing a dataset.
///
/// This enum captures every failure mode: scan-time misconfiguration, invalid
/// lookups, split-planning precondition violations, and per-item decode
/// failures. Using a single error type across the library simplifies error
/// propagation, and every variant carries enough context (path, index, class)
/// to diagnose without re-running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dataset root is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The root contains no class subdirectories, or no images at all.
    #[error("empty dataset at {}: {reason}", .root.display())]
    EmptyDataset { root: PathBuf, reason: String },

    /// Class name lookup failed.
    #[error("unknown class name: {0:?}")]
    UnknownClassName(String),

    /// Class index lookup failed.
    #[error("unknown class index: {index} (dataset has {count} classes)")]
    UnknownClassIndex { index: u32, count: u32 },

    /// Entry access out of the index range.
    #[error("entry index {index} out of range for dataset of size {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Split fractions are negative or do not sum to 1.
    #[error("invalid split fractions ({train}, {val}, {test}): {reason}")]
    InvalidFractions {
        train: f64,
        val: f64,
        test: f64,
        reason: String,
    },

    /// A class is too small to populate train, val, and test.
    #[error("class {label} has {count} samples, need at least 3 to stratify")]
    InsufficientSamples { label: u32, count: usize },

    /// Loader configured with a zero batch size.
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    /// A subset index handed to the loader does not exist in the dataset.
    #[error("subset refers to entry {index}, but the dataset has {len} entries")]
    InvalidSubsetIndex { index: usize, len: usize },

    /// Image decoding failed (corrupt or unsupported file).
    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// A tensor did not have the shape an operation requires.
    #[error("shape mismatch: expected {expected}, got {got:?}")]
    BadShape {
        expected: &'static str,
        got: Vec<usize>,
    },

    /// I/O error, with the path that produced it.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience Result type used throughout magpie.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Msg(format!($($arg)*)))
    };
}
