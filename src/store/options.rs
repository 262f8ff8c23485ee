//! Dropdown option cache
//!
//! Maps a form field name to the list of display strings scraped from its
//! dropdown. Scraping is slow and chatty, so each list is persisted on first
//! scrape and reused until invalidated. Entries carry no expiry; staleness
//! against the tracker's configuration is an accepted risk.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    fields: HashMap<String, Vec<String>>,
}

/// File-backed key-value store of field name -> ordered option strings
pub struct OptionCacheStore {
    path: PathBuf,
    file: CacheFile,
}

impl OptionCacheStore {
    /// Open the cache at an explicit path, loading existing contents.
    ///
    /// A missing or unparseable file starts the cache empty.
    pub fn open(path: PathBuf) -> Self {
        let file = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(file) => file,
                    Err(e) => {
                        warn!("Failed to parse option cache, starting empty: {}", e);
                        CacheFile::default()
                    }
                },
                Err(e) => {
                    warn!("Failed to read option cache, starting empty: {}", e);
                    CacheFile::default()
                }
            }
        } else {
            CacheFile::default()
        };

        Self { path, file }
    }

    /// Open the cache at the default location in the state directory
    pub fn open_default() -> Option<Self> {
        crate::state_dir().map(|dir| Self::open(dir.join("option_cache.json")))
    }

    /// Get the cached option list for a field
    pub fn get(&self, field: &str) -> Option<&[String]> {
        let options = self.file.fields.get(field)?;
        debug!("Option cache hit for {} ({} options)", field, options.len());
        Some(options.as_slice())
    }

    /// Store a freshly scraped option list and persist immediately
    pub fn put(&mut self, field: &str, options: Vec<String>) {
        info!("Caching {} options for {}", options.len(), field);
        self.file.fields.insert(field.to_string(), options);
        self.persist();
    }

    /// Drop one field's cached options
    pub fn invalidate(&mut self, field: &str) {
        if self.file.fields.remove(field).is_some() {
            info!("Invalidated cached options for {}", field);
            self.persist();
        }
    }

    /// Drop every cached list
    pub fn clear(&mut self) {
        self.file.fields.clear();
        self.persist();
    }

    /// Number of cached fields
    pub fn len(&self) -> usize {
        self.file.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.fields.is_empty()
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create cache directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(&self.file) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    warn!("Failed to write option cache: {}", e);
                }
            }
            Err(e) => {
                warn!("Failed to serialize option cache: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = OptionCacheStore::open(dir.path().join("option_cache.json"));

        assert!(cache.get("workType").is_none());
        cache.put(
            "workType",
            vec!["Task".to_string(), "Story".to_string(), "Bug".to_string()],
        );

        let options = cache.get("workType").unwrap();
        assert_eq!(options, ["Task", "Story", "Bug"]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("option_cache.json");

        {
            let mut cache = OptionCacheStore::open(path.clone());
            cache.put("riskLevel", vec!["Low".to_string(), "High".to_string()]);
        }

        // Second run: the cache is already populated, no scrape needed
        let cache = OptionCacheStore::open(path);
        assert_eq!(cache.get("riskLevel").unwrap(), ["Low", "High"]);
    }

    #[test]
    fn test_invalidate_removes_single_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = OptionCacheStore::open(dir.path().join("option_cache.json"));

        cache.put("workType", vec!["Bug".to_string()]);
        cache.put("component", vec!["Platform".to_string()]);

        cache.invalidate("workType");
        assert!(cache.get("workType").is_none());
        assert!(cache.get("component").is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("option_cache.json");
        std::fs::write(&path, "definitely not json").unwrap();

        let cache = OptionCacheStore::open(path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("option_cache.json");

        let mut cache = OptionCacheStore::open(path.clone());
        cache.put("workType", vec!["Bug".to_string()]);
        cache.clear();

        assert!(cache.is_empty());
        let reopened = OptionCacheStore::open(path);
        assert!(reopened.is_empty());
    }
}
