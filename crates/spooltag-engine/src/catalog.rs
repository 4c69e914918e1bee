//! Filament catalog.
//!
//! A JSON file mapping SKUs to product metadata: display name, payload
//! file and an optional per-SKU authentication key list that overrides the
//! configured defaults for sessions programming that filament.

use serde::{Deserialize, Serialize};
use spooltag_core::{AuthKey, Result, Sku};
use std::collections::HashMap;
use std::path::Path;

/// One catalog entry describing a filament product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilamentEntry {
    /// Product SKU.
    pub sku: Sku,

    /// Human-readable product name.
    pub name: String,

    /// Longer product description.
    pub description: String,

    /// Payload file name inside the binaries directory.
    pub binary_file: String,

    /// Authentication keys overriding the configured defaults, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<AuthKey>>,
}

/// SKU-indexed collection of filament entries.
#[derive(Debug, Clone, Default)]
pub struct FilamentCatalog {
    entries: HashMap<Sku, FilamentEntry>,
}

impl FilamentCatalog {
    /// Load a catalog from a JSON mapping file (`{ "SKU": { ... }, ... }`).
    ///
    /// Map keys are normalized through [`Sku`], so lookups stay
    /// case-insensitive regardless of how the file spells them.
    ///
    /// # Errors
    /// Returns `Error::Io` / `Error::Json` on unreadable or malformed
    /// files, or `Error::InvalidSku` for unusable keys.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a catalog from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, FilamentEntry> = serde_json::from_str(raw)?;

        let mut entries = HashMap::with_capacity(parsed.len());
        for (key, entry) in parsed {
            entries.insert(Sku::new(&key)?, entry);
        }
        Ok(Self { entries })
    }

    /// Look up the entry for a SKU.
    pub fn entry(&self, sku: &Sku) -> Option<&FilamentEntry> {
        self.entries.get(sku)
    }

    /// Per-SKU key override, if the entry defines one.
    pub fn keys_for(&self, sku: &Sku) -> Option<&[AuthKey]> {
        self.entry(sku).and_then(|e| e.keys.as_deref())
    }

    /// All entries, sorted by SKU for stable listings.
    pub fn entries(&self) -> Vec<&FilamentEntry> {
        let mut entries: Vec<&FilamentEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.sku.as_str().cmp(b.sku.as_str()));
        entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
