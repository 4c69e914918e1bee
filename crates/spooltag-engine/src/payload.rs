//! Binary payload store.
//!
//! Maps a SKU to the fixed-size byte image written to each tag. The store
//! is read-only from the engine's perspective: a payload is resolved once
//! at session start and never mutated.

use spooltag_core::constants::{BLOCK_SIZE, TAG_CAPACITY};
use spooltag_core::{Error, Result, Sku};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::FilamentCatalog;

/// Immutable 1024-byte tag image, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPayload(Arc<[u8; TAG_CAPACITY]>);

impl TagPayload {
    /// Build a payload from raw bytes.
    ///
    /// # Errors
    /// Returns `Error::PayloadSize` unless `bytes` is exactly 1024 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TAG_CAPACITY {
            return Err(Error::PayloadSize {
                expected: TAG_CAPACITY,
                actual: bytes.len(),
            });
        }
        let mut data = [0u8; TAG_CAPACITY];
        data.copy_from_slice(bytes);
        Ok(Self(Arc::new(data)))
    }

    /// The full 1024-byte image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TAG_CAPACITY] {
        &self.0
    }

    /// The 16 bytes belonging to `block` at its fixed offset.
    ///
    /// # Panics
    /// Panics if `block` is out of the tag's 64-block range.
    #[must_use]
    pub fn block(&self, block: u8) -> [u8; BLOCK_SIZE] {
        let offset = block as usize * BLOCK_SIZE;
        let mut data = [0u8; BLOCK_SIZE];
        data.copy_from_slice(&self.0[offset..offset + BLOCK_SIZE]);
        data
    }
}

/// Read-only SKU-to-payload lookup.
pub trait PayloadStore: Send + Sync {
    /// Resolve the payload for a SKU.
    ///
    /// # Errors
    /// Returns `Error::UnknownSku` if the SKU has no payload.
    fn get_payload(&self, sku: &Sku) -> Result<TagPayload>;

    /// Whether a payload exists for the SKU.
    fn contains(&self, sku: &Sku) -> bool {
        self.get_payload(sku).is_ok()
    }
}

/// Payload store backed by a directory of `.bin` files.
///
/// Without a catalog, the file for SKU `PLA001` is `pla001.bin`. With a
/// catalog attached, the catalog's `binary_file` entry names the file and
/// SKUs absent from the catalog are unknown.
#[derive(Debug, Clone)]
pub struct DirectoryPayloadStore {
    dir: PathBuf,
    catalog: Option<FilamentCatalog>,
}

impl DirectoryPayloadStore {
    /// Create a store over a binaries directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            catalog: None,
        }
    }

    /// Attach a filament catalog that names the payload files.
    #[must_use]
    pub fn with_catalog(mut self, catalog: FilamentCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Path of the payload file for a SKU, if the SKU is known.
    pub fn payload_path(&self, sku: &Sku) -> Option<PathBuf> {
        match &self.catalog {
            Some(catalog) => catalog
                .entry(sku)
                .map(|entry| self.dir.join(&entry.binary_file)),
            None => Some(self.dir.join(format!("{}.bin", sku.file_stem()))),
        }
    }
}

impl PayloadStore for DirectoryPayloadStore {
    fn get_payload(&self, sku: &Sku) -> Result<TagPayload> {
        let path = self
            .payload_path(sku)
            .ok_or_else(|| Error::UnknownSku(sku.to_string()))?;

        let bytes =
            std::fs::read(&path).map_err(|_| Error::UnknownSku(sku.to_string()))?;
        TagPayload::from_bytes(&bytes)
    }
}

/// In-memory payload store for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct MemoryPayloadStore {
    payloads: HashMap<Sku, TagPayload>,
}

impl MemoryPayloadStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload for a SKU.
    pub fn insert(&mut self, sku: Sku, payload: TagPayload) {
        self.payloads.insert(sku, payload);
    }
}

impl PayloadStore for MemoryPayloadStore {
    fn get_payload(&self, sku: &Sku) -> Result<TagPayload> {
        self.payloads
            .get(sku)
            .cloned()
            .ok_or_else(|| Error::UnknownSku(sku.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_payload() -> TagPayload {
        let bytes: Vec<u8> = (0..TAG_CAPACITY).map(|i| (i % 256) as u8).collect();
        TagPayload::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_payload_rejects_wrong_size() {
        assert!(TagPayload::from_bytes(&[0u8; 1023]).is_err());
        assert!(TagPayload::from_bytes(&[0u8; 1025]).is_err());
        assert!(TagPayload::from_bytes(&[0u8; 1024]).is_ok());
    }

    #[test]
    fn test_payload_block_offsets() {
        let payload = patterned_payload();

        let block4 = payload.block(4);
        assert_eq!(block4[0], 64); // 4 * 16
        assert_eq!(block4[15], 79);
    }

    #[test]
    fn test_memory_store_lookup() {
        let sku = Sku::new("PLA001").unwrap();
        let mut store = MemoryPayloadStore::new();
        store.insert(sku.clone(), patterned_payload());

        assert!(store.contains(&sku));
        assert_eq!(store.get_payload(&sku).unwrap(), patterned_payload());

        let missing = Sku::new("ABS999").unwrap();
        assert!(matches!(
            store.get_payload(&missing),
            Err(Error::UnknownSku(_))
        ));
    }

    #[test]
    fn test_memory_store_is_case_insensitive_via_sku() {
        let mut store = MemoryPayloadStore::new();
        store.insert(Sku::new("PLA001").unwrap(), patterned_payload());

        // Normalization happens in Sku, so lowercase input resolves.
        assert!(store.contains(&Sku::new("pla001").unwrap()));
    }

    #[test]
    fn test_directory_store_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let payload = patterned_payload();
        std::fs::write(dir.path().join("pla001.bin"), payload.as_bytes()).unwrap();

        let store = DirectoryPayloadStore::new(dir.path());
        let sku = Sku::new("PLA001").unwrap();
        assert_eq!(store.get_payload(&sku).unwrap(), payload);
    }

    #[test]
    fn test_directory_store_unknown_sku() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPayloadStore::new(dir.path());

        let result = store.get_payload(&Sku::new("MISSING1").unwrap());
        assert!(matches!(result, Err(Error::UnknownSku(_))));
    }

    #[test]
    fn test_directory_store_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pla001.bin"), [0u8; 100]).unwrap();

        let store = DirectoryPayloadStore::new(dir.path());
        let result = store.get_payload(&Sku::new("PLA001").unwrap());
        assert!(matches!(result, Err(Error::PayloadSize { .. })));
    }
}
