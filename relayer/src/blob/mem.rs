//! In-memory blob store keyed by BLAKE3 digest.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{BlobError, BlobStore};
use crate::types::Hash256;

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn add(&self, bytes: &[u8]) -> Result<String, BlobError> {
        let id = Hash256::compute(bytes).to_hex();
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| BlobError::Unavailable("blob map lock poisoned".into()))?;
        blobs.insert(id.clone(), bytes.to_vec());
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Vec<u8>, BlobError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| BlobError::Unavailable("blob map lock poisoned".into()))?;
        blobs
            .get(id)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(id.to_string()))
    }
}
