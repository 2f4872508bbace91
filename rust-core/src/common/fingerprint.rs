//! Content fingerprints used to key cached tables.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::common::error::{EngineError, EngineResult};

/// SHA-256 digest of a file's bytes, rendered as `sha256:<hex>`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    pub fn of_file(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Err(EngineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).map_err(|e| EngineError::io(path, e))?;
        Ok(Self::of_bytes(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
