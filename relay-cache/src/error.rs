use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Only a single trailing `*` is understood.
    #[error("unsupported cache key pattern: {0}")]
    UnsupportedPattern(String),
}
