/// Result alias that carries the custom [`SourceDefaultsError`] type.
pub type Result<T> = std::result::Result<T, SourceDefaultsError>;

/// Common error type for the core crate.
///
/// Engine callbacks never fail; they report skips through outcome values and
/// log lines. This type covers the fallible surfaces around the engine, such
/// as loading a scenario file and driving the in-memory host from it.
#[derive(Debug, thiserror::Error)]
pub enum SourceDefaultsError {
    /// A scenario step referenced a source that does not exist.
    #[error("unknown source `{0}`")]
    UnknownSource(String),
    /// A scenario step referenced a scene that does not exist.
    #[error("unknown scene `{0}`")]
    UnknownScene(String),
    /// A scenario step referenced a filter that is not attached anywhere.
    #[error("no source defaults filter attached to `{0}`")]
    UnknownFilter(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}
