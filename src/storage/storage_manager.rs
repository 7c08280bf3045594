use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Resolves and writes files in the local data directory.
#[derive(Debug, Clone)]
pub struct StorageManager {
    data_dir: PathBuf,
}

impl StorageManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn exists(&self, file_name: &str) -> bool {
        self.path_for(file_name).is_file()
    }

    pub fn read_to_string(&self, file_name: &str) -> Result<String> {
        let path = self.path_for(file_name);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Writes through a uniquely named part file and renames it into place,
    /// so readers never see a half-written snapshot.
    pub fn write_atomic(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;

        let target = self.path_for(file_name);
        let part = self
            .data_dir
            .join(format!(".{}.{}.part", file_name, Uuid::new_v4()));

        fs::write(&part, bytes).with_context(|| format!("Failed to write {}", part.display()))?;
        fs::rename(&part, &target)
            .with_context(|| format!("Failed to move snapshot into {}", target.display()))?;

        Ok(target)
    }
}
