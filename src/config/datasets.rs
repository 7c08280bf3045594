use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const RAINFALL_DISTRICT: &str = "rainfall_district";
pub const RAINFALL_SUBBASIN: &str = "rainfall_subbasin";
pub const RAINFALL_RAJASTHAN_MONSOON: &str = "rainfall_rajasthan_monsoon";

/// Remote dataset on the open-data portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    #[serde(alias = "desc")]
    pub description: String,
    #[serde(alias = "filters", default)]
    pub supported_filters: BTreeSet<String>,
}

impl DatasetDescriptor {
    fn new(id: &str, description: &str, filters: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            supported_filters: filters.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn supports(&self, field: &str) -> bool {
        self.supported_filters.contains(field)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    datasets: BTreeMap<String, DatasetDescriptor>,
}

/// Logical dataset name -> descriptor. Built once at startup, read-only after.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, DatasetDescriptor>,
}

impl DatasetRegistry {
    pub fn builtin() -> Self {
        let mut datasets = BTreeMap::new();
        datasets.insert(
            RAINFALL_DISTRICT.to_string(),
            DatasetDescriptor::new(
                "6c05cd1b-ed59-40c2-bc31-e314f39c6971",
                "District-wise Daily Rainfall Data (All India, IMD)",
                &["State", "Year", "Month", "District"],
            ),
        );
        datasets.insert(
            RAINFALL_SUBBASIN.to_string(),
            DatasetDescriptor::new(
                "da428447-700a-41e9-a56a-d7855ffb672f",
                "Daily Sub-basin-wise Rainfall Data (HVD)",
                &["Sub-basin", "Date"],
            ),
        );
        datasets.insert(
            RAINFALL_RAJASTHAN_MONSOON.to_string(),
            DatasetDescriptor::new(
                "c9302010-023d-4c91-863e-3177079c0410",
                "Rajasthan Monsoon 2018 Rainfall Statistics",
                &["District"],
            ),
        );
        Self { datasets }
    }

    /// Built-in registry with entries from a TOML file layered on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset registry: {}", path.display()))?;
        let file: RegistryFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse dataset registry: {}", path.display()))?;

        let mut registry = Self::builtin();
        registry.datasets.extend(file.datasets);
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&DatasetDescriptor> {
        self.datasets.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&DatasetDescriptor> {
        self.get(name)
            .ok_or_else(|| anyhow!("Dataset '{}' is not registered", name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DatasetDescriptor)> {
        self.datasets.iter()
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
