use anyhow::{Context, Result, bail};
use polars::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::storage_manager::StorageManager;
use crate::models::{Crop, CropRecord};
use crate::processor::{JsonFlattener, RuleNormalizer};

/// Which of the accepted snapshot layouts a file used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotShape {
    Records,
    DataWithFields,
    BareList,
}

/// Reads pre-downloaded open-data exports from the data directory.
pub struct LocalDatasetLoader {
    storage: StorageManager,
    flattener: JsonFlattener,
}

impl LocalDatasetLoader {
    pub fn new(storage: StorageManager) -> Self {
        Self {
            storage,
            flattener: JsonFlattener::new(),
        }
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn load(&self, file_name: &str) -> Result<DataFrame> {
        let content = self.storage.read_to_string(file_name)?;
        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", file_name))?;

        let (shape, df) = self.parse(&data, file_name)?;
        info!(
            "Loaded {} ({:?}): {} rows, {} columns",
            file_name,
            shape,
            df.height(),
            df.width()
        );
        Ok(df)
    }

    /// Accepts, in order: `{"records": [...]}`, `{"data": [[...]], "fields":
    /// [...]}` and a bare list of objects.
    pub fn parse(&self, data: &Value, file_name: &str) -> Result<(SnapshotShape, DataFrame)> {
        if let Some(records) = data.get("records").and_then(|r| r.as_array()) {
            return Ok((
                SnapshotShape::Records,
                self.flattener.flatten_to_dataframe(records)?,
            ));
        }

        if let Some(rows) = data.get("data").and_then(|d| d.as_array()) {
            let field_ids = field_ids(data.get("fields"));
            if field_ids.is_empty() {
                warn!("{} has no usable 'fields'; using positional column names", file_name);
            }
            return Ok((
                SnapshotShape::DataWithFields,
                self.flattener.rows_to_dataframe(&field_ids, rows)?,
            ));
        }

        if let Some(list) = data.as_array() {
            return Ok((
                SnapshotShape::BareList,
                self.flattener.flatten_to_dataframe(list)?,
            ));
        }

        let keys: Vec<&str> = data
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        bail!("Unsupported JSON format in {}: keys={:?}", file_name, keys)
    }

    /// Rice and jowar snapshots merged into one list, rice first.
    pub fn load_crop_data(&self, rice_file: &str, jowar_file: &str) -> Result<Vec<CropRecord>> {
        let normalizer = RuleNormalizer::new()?;
        let mut records = Vec::new();

        for (crop, file_name) in [(Crop::Rice, rice_file), (Crop::Jowar, jowar_file)] {
            let raw = self.load(file_name)?;
            let normalized = normalizer
                .normalize_crop(&raw, crop)
                .with_context(|| format!("Failed to normalize {}", file_name))?;
            records.extend(normalized);
        }

        info!("Crop data ready: {} records", records.len());
        Ok(records)
    }

    /// The `records` of a cached rainfall export, or `None` when no cache file
    /// exists. A cache without `records` reads as empty.
    pub fn load_rainfall_cache(&self, file_name: &str) -> Result<Option<DataFrame>> {
        if !self.storage.exists(file_name) {
            debug!("No local rainfall cache at {}", self.storage.path_for(file_name).display());
            return Ok(None);
        }

        let content = self.storage.read_to_string(file_name)?;
        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", file_name))?;
        let records = data
            .get("records")
            .and_then(|r| r.as_array())
            .map(|r| r.as_slice())
            .unwrap_or(&[]);

        Ok(Some(self.flattener.flatten_to_dataframe(records)?))
    }
}

/// Column ids from a `fields` header. Each entry is an object with an `id`
/// or a bare string; anything else gets its position as the name.
fn field_ids(fields: Option<&Value>) -> Vec<String> {
    let Some(fields) = fields.and_then(|f| f.as_array()) else {
        return Vec::new();
    };

    fields
        .iter()
        .enumerate()
        .map(|(i, field)| match field {
            Value::String(s) => s.clone(),
            Value::Object(o) => o
                .get("id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| i.to_string()),
            _ => i.to_string(),
        })
        .collect()
}
