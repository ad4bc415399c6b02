// Project path cache
//
// Remembers the active project root in a small TOML file so tools invoked
// without an explicit path land in the right workspace. Constructed
// explicitly and handed to the tools that need it.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    current_project: Option<ProjectEntry>,
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectEntry {
    path: String,
    updated_at: String,
}

pub struct PathCache {
    cache_file: PathBuf,
}

impl PathCache {
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
        }
    }

    /// Default location under the user's home directory.
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".stratum").join("path_cache.toml")))
    }

    /// The cached project root, if it still exists on disk. A missing or
    /// malformed cache file just means no cached path.
    pub fn project_path(&self) -> Option<PathBuf> {
        let contents = fs::read_to_string(&self.cache_file).ok()?;
        let cache: CacheFile = toml::from_str(&contents).ok()?;
        let entry = cache.current_project?;
        let path = PathBuf::from(entry.path);
        path.is_dir().then_some(path)
    }

    /// Record `path` as the active project root.
    pub fn set_project_path(&self, path: &Path) -> Result<()> {
        let mut cache = fs::read_to_string(&self.cache_file)
            .ok()
            .and_then(|contents| toml::from_str::<CacheFile>(&contents).ok())
            .unwrap_or_default();

        let entry = ProjectEntry {
            path: path.display().to_string(),
            updated_at: Utc::now().to_rfc3339(),
        };
        cache.projects.retain(|p| p.path != entry.path);
        cache.projects.push(entry.clone());
        cache.current_project = Some(entry);

        if let Some(parent) = self.cache_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(&cache).context("Failed to serialize path cache")?;
        fs::write(&self.cache_file, contents)
            .with_context(|| format!("Failed to write {}", self.cache_file.display()))?;
        Ok(())
    }
}
