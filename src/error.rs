use thiserror::Error;

/// Failures while decoding (or, for generic payloads, encoding) spilled bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated input")]
    Truncated,
    #[error("Unknown tag: {0}")]
    UnknownTag(u64),
    #[error("Malformed input: {0}")]
    Malformed(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

#[derive(Error, Debug)]
pub enum SpillError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Could not initialize spill store: {0}")]
    StoreInit(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Spill store is closed")]
    Closed,
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, SpillError>;

// Helper conversions
impl From<rusqlite::Error> for SpillError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<config::ConfigError> for SpillError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
