// DAG document storage
//
// JSON persistence for layer documents under a project-local data
// directory, with backup-on-overwrite and storage statistics. Constructed
// explicitly per project and passed where needed; there is no process-wide
// instance.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a successful save.
#[derive(Debug, Clone, Serialize)]
pub struct SavedDag {
    pub filename: String,
    pub dag_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub backup_created: bool,
}

/// One stored document as seen by a directory scan.
#[derive(Debug, Clone, Serialize)]
pub struct DagFileInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub total_dags: usize,
    pub backup_files: usize,
    pub temp_files: usize,
    pub total_size_bytes: u64,
    pub backup_size_bytes: u64,
    pub storage_path: PathBuf,
}

pub struct DagStorage {
    base_path: PathBuf,
    dags_path: PathBuf,
    backups_path: PathBuf,
    temp_path: PathBuf,
}

impl DagStorage {
    /// Open (and create if needed) the storage layout under `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let storage = Self {
            dags_path: base_path.join("dags"),
            backups_path: base_path.join("backups"),
            temp_path: base_path.join("temp"),
            base_path,
        };
        for dir in [
            &storage.base_path,
            &storage.dags_path,
            &storage.backups_path,
            &storage.temp_path,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        }
        Ok(storage)
    }

    pub fn dags_path(&self) -> &Path {
        &self.dags_path
    }

    /// Persist a document. The filename is derived from the document's
    /// `layer_type` field and either the given id or a content hash. An
    /// existing file with the same name is backed up first.
    pub fn save_dag(&self, mut document: Value, dag_id: Option<&str>) -> Result<SavedDag> {
        if let Some(object) = document.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }

        let dag_id = match dag_id {
            Some(id) => id.to_string(),
            None => content_hash(&document),
        };
        let layer = document
            .get("layer_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let filename = format!("{layer}_layer_{dag_id}.json");
        let path = self.dags_path.join(&filename);

        let backup_created = if path.exists() {
            self.create_backup(&path)?
        } else {
            false
        };

        let json =
            serde_json::to_string_pretty(&document).context("Failed to serialize DAG document")?;

        // Write via a temp file then rename so readers never see a partial file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write to {}", temp_path.display()))?;
        fs::rename(&temp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;

        let size_bytes = fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        Ok(SavedDag {
            filename,
            dag_id,
            path,
            size_bytes,
            backup_created,
        })
    }

    pub fn load_dag(&self, filename: &str) -> Result<Value> {
        let path = self.dags_path.join(filename);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read DAG file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse DAG file {filename}"))
    }

    /// All stored documents, newest first. Backups are excluded.
    pub fn list_dags(&self) -> Result<Vec<DagFileInfo>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dags_path)
            .with_context(|| format!("Failed to scan {}", self.dags_path.display()))?
        {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".json") || filename.ends_with(".backup.json") {
                continue;
            }
            let metadata = entry.metadata()?;
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            files.push(DagFileInfo {
                filename,
                size_bytes: metadata.len(),
                modified_at,
            });
        }
        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(files)
    }

    /// Delete a document and its backup. Returns whether a backup was
    /// deleted alongside it.
    pub fn delete_dag(&self, filename: &str) -> Result<bool> {
        let path = self.dags_path.join(filename);
        if !path.exists() {
            anyhow::bail!("DAG file not found: {filename}");
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;

        let backup_path = path.with_extension("backup.json");
        if backup_path.exists() {
            fs::remove_file(&backup_path)
                .with_context(|| format!("Failed to delete backup {}", backup_path.display()))?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let mut total_dags = 0;
        let mut backup_files = 0;
        let mut total_size_bytes = 0;
        let mut backup_size_bytes = 0;

        for entry in fs::read_dir(&self.dags_path)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".json") {
                continue;
            }
            let size = entry.metadata()?.len();
            if filename.ends_with(".backup.json") {
                backup_files += 1;
                backup_size_bytes += size;
            } else {
                total_dags += 1;
                total_size_bytes += size;
            }
        }

        let temp_files = fs::read_dir(&self.temp_path)?.count();

        Ok(StorageStats {
            total_dags,
            backup_files,
            temp_files,
            total_size_bytes,
            backup_size_bytes,
            storage_path: self.base_path.clone(),
        })
    }

    fn create_backup(&self, path: &Path) -> Result<bool> {
        let backup_path = path.with_extension("backup.json");
        fs::copy(path, &backup_path)
            .with_context(|| format!("Failed to back up {}", path.display()))?;
        Ok(true)
    }
}

/// Short content hash used as a document id when none is given.
fn content_hash(document: &Value) -> String {
    let canonical = document.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}
