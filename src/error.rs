/// Typed outcomes the pipeline driver needs to distinguish from opaque I/O or parse
/// failures. Component functions that can produce one of these return
/// `anyhow::Result<T>` with a `CoreError` at the root of the chain so the driver can
/// `downcast_ref` to decide whether to retry, skip, or abort (see `driver.rs`).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("memory budget exceeded in {stage}: estimated {estimate_bytes} bytes > limit {limit_bytes} bytes")]
    NoMem {
        stage: String,
        estimate_bytes: u64,
        limit_bytes: u64,
    },

    #[error("insufficient intra-sequence data to fit normalization curve: r_max={r_max} < r_min_bands={r_min_bands}")]
    NoBands { r_max: usize, r_min_bands: usize },

    #[error("scaffold count {count} exceeds hard ceiling {ceiling}")]
    SeqLimit { count: usize, ceiling: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Process exit code per the CLI contract (spec.md §6).
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::NoBands { .. } => 14,
            CoreError::NoMem { .. } => 15,
            _ => 1,
        }
    }
}

/// Recover a `CoreError` from the root of an `anyhow` error chain, if one is present.
pub fn downcast(err: &anyhow::Error) -> Option<&CoreError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CoreError>())
}
