use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// The document or chunk changed since it was read. Reload and decide.
    Conflict(String),
    RetriesExhausted {
        key: String,
        attempts: u32,
    },
    Storage(StoreError),
    Serialization(String),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Conflict(key) => write!(f, "concurrent modification of {key}"),
            EngineError::RetriesExhausted { key, attempts } => {
                write!(f, "gave up on {key} after {attempts} conflicting attempts")
            }
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
            EngineError::Serialization(e) => write!(f, "serialization error: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(key) => EngineError::Conflict(key),
            other => EngineError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
