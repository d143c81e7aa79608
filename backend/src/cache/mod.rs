//! Mapping store - remember how each import context was mapped
//!
//! After a successful commit the session saves the field mapping and column
//! type overrides under the context name. The next import of the same
//! context starts from them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::models::{ColumnType, FieldMapping};

/// Directory where mappings are stored (relative to current dir)
const DEFAULT_STORE_DIR: &str = ".sheetload/mappings";

/// A saved mapping with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPreference {
    /// Import context this mapping belongs to
    pub context: String,
    /// System field key -> header
    pub mapping: FieldMapping,
    /// Header -> confirmed column type
    #[serde(default)]
    pub column_types: BTreeMap<String, ColumnType>,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
    /// Number of commits that saved this mapping
    #[serde(default)]
    pub use_count: u32,
}

impl StoredPreference {
    pub fn new(
        context: impl Into<String>,
        mapping: FieldMapping,
        column_types: BTreeMap<String, ColumnType>,
    ) -> Self {
        Self {
            context: context.into(),
            mapping,
            column_types,
            updated_at: chrono::Utc::now().to_rfc3339(),
            use_count: 1,
        }
    }
}

/// Prior-mapping store, keyed by context.
pub trait MappingStore: Send {
    fn get(&self, context: &str) -> Option<StoredPreference>;

    fn put(&mut self, preference: StoredPreference) -> StoreResult<()>;

    fn remove(&mut self, context: &str) -> StoreResult<()>;

    fn list(&self) -> Vec<StoredPreference>;

    /// Save a mapping, carrying over the use count of the previous one.
    fn remember(
        &mut self,
        context: &str,
        mapping: FieldMapping,
        column_types: BTreeMap<String, ColumnType>,
    ) -> StoreResult<()> {
        let mut preference = StoredPreference::new(context, mapping, column_types);
        if let Some(previous) = self.get(context) {
            preference.use_count = previous.use_count.saturating_add(1);
        }
        self.put(preference)
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// One JSON file per context in a directory
pub struct FileMappingStore {
    /// Directory where mappings are stored
    store_dir: PathBuf,
    /// Loaded mappings (context -> preference)
    preferences: HashMap<String, StoredPreference>,
}

impl FileMappingStore {
    /// Create a store in the default directory, loading existing mappings
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_STORE_DIR)
    }

    /// Create a store with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut store = Self {
            store_dir: PathBuf::from(dir.as_ref()),
            preferences: HashMap::new(),
        };
        store.load_all();
        store
    }

    pub fn dir(&self) -> &Path {
        &self.store_dir
    }

    /// Load all mappings from the store directory; unreadable files are skipped
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.store_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(pref) = serde_json::from_str::<StoredPreference>(&content) {
                        self.preferences.insert(pref.context.clone(), pref);
                    }
                }
            }
        }
    }

    fn path_for(&self, context: &str) -> PathBuf {
        self.store_dir.join(format!("{}.json", slug(context)))
    }
}

impl Default for FileMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingStore for FileMappingStore {
    fn get(&self, context: &str) -> Option<StoredPreference> {
        self.preferences.get(context).cloned()
    }

    fn put(&mut self, preference: StoredPreference) -> StoreResult<()> {
        fs::create_dir_all(&self.store_dir)?;

        let content = serde_json::to_string_pretty(&preference)?;
        fs::write(self.path_for(&preference.context), content)?;

        self.preferences.insert(preference.context.clone(), preference);
        Ok(())
    }

    fn remove(&mut self, context: &str) -> StoreResult<()> {
        if self.preferences.remove(context).is_none() {
            return Err(StoreError::NotFound(context.to_string()));
        }
        let path = self.path_for(context);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn list(&self) -> Vec<StoredPreference> {
        let mut all: Vec<StoredPreference> = self.preferences.values().cloned().collect();
        all.sort_by(|a, b| a.context.cmp(&b.context));
        all
    }
}

/// File-name-safe form of a context name
fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// =============================================================================
// In-memory store
// =============================================================================

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    preferences: BTreeMap<String, StoredPreference>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryMappingStore {
    fn get(&self, context: &str) -> Option<StoredPreference> {
        self.preferences.get(context).cloned()
    }

    fn put(&mut self, preference: StoredPreference) -> StoreResult<()> {
        self.preferences.insert(preference.context.clone(), preference);
        Ok(())
    }

    fn remove(&mut self, context: &str) -> StoreResult<()> {
        self.preferences
            .remove(context)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(context.to_string()))
    }

    fn list(&self) -> Vec<StoredPreference> {
        self.preferences.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mapping() -> FieldMapping {
        [("amount", "Total"), ("date", "Fecha")].into_iter().collect()
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Income Statement"), "income-statement");
        assert_eq!(slug("purchase"), "purchase");
        assert_eq!(slug("  a__b  "), "a-b");
    }

    #[test]
    fn test_file_store_roundtrip_across_instances() {
        let dir = tempdir().unwrap();
        let mut types = BTreeMap::new();
        types.insert("Total".to_string(), ColumnType::Currency);

        let mut store = FileMappingStore::with_dir(dir.path());
        store.remember("purchase", mapping(), types.clone()).unwrap();
        assert!(dir.path().join("purchase.json").exists());

        let reloaded = FileMappingStore::with_dir(dir.path());
        let pref = reloaded.get("purchase").unwrap();
        assert_eq!(pref.mapping, mapping());
        assert_eq!(pref.column_types, types);
        assert_eq!(pref.use_count, 1);
    }

    #[test]
    fn test_remember_counts_uses() {
        let mut store = MemoryMappingStore::new();
        store.remember("tips", mapping(), BTreeMap::new()).unwrap();
        store.remember("tips", mapping(), BTreeMap::new()).unwrap();
        assert_eq!(store.get("tips").unwrap().use_count, 2);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let mut store = FileMappingStore::with_dir(dir.path());
        store.remember("generic", mapping(), BTreeMap::new()).unwrap();

        store.remove("generic").unwrap();
        assert!(store.get("generic").is_none());
        assert!(!dir.path().join("generic.json").exists());
        assert!(matches!(store.remove("generic"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_missing_dir_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = FileMappingStore::with_dir(dir.path().join("nope"));
        assert!(store.list().is_empty());
    }
}
