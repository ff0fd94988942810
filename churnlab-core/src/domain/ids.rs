use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry version number of a model artifact (1-based, assigned on register).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersion(pub u32);

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Deterministic dataset hash (BLAKE3 over an assembled, key-sorted frame).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one tracked training/evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Derive a run id from the run name, the dataset it saw and its start time.
    ///
    /// Uses BLAKE3 so ids are stable across builds and platforms.
    pub fn derive(run_name: &str, dataset: &DatasetHash, started_at: &chrono::NaiveDateTime) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(run_name.as_bytes());
        hasher.update(dataset.0.as_bytes());
        hasher.update(started_at.to_string().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex[..16].to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
