//! Types d'erreurs pour pmomedia

/// Erreurs remontées par un collaborateur média
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("I/O error while reading: {0}")]
    Io(String),

    #[error("Filter graph build failed: {0}")]
    GraphBuild(String),

    #[error("Filter graph rejected frame: {0}")]
    GraphFeed(String),

    #[error("Unsupported media parameter: {0}")]
    Unsupported(String),
}

/// Type Result spécialisé pour pmomedia
pub type Result<T> = std::result::Result<T, MediaError>;
