//! Project configuration read from an optional `nomenclature.toml`.
//!
//! ```toml
//! dimensions = ["region", "variable"]
//! definitions = "definitions"
//! mappings = "mappings"
//! validation = "validate_data"
//! required-data = "required_data"
//!
//! [region-processing]
//! rtol = 0.01
//! atol = 0.0
//! ```

use crate::definition::Dimension;
use crate::errors::{NomenclatureError, NomenclatureResult};
use crate::utils::{read_to_string, relative_path};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "nomenclature.toml";

/// Tolerances used when comparing aggregated with reported data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionProcessingConfig {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for RegionProcessingConfig {
    fn default() -> Self {
        Self {
            rtol: 0.01,
            atol: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NomenclatureConfig {
    pub dimensions: Vec<Dimension>,
    pub definitions: PathBuf,
    pub mappings: PathBuf,
    pub validation: PathBuf,
    pub required_data: PathBuf,
    pub region_processing: RegionProcessingConfig,
}

impl Default for NomenclatureConfig {
    fn default() -> Self {
        Self {
            dimensions: vec![Dimension::Region, Dimension::Variable],
            definitions: PathBuf::from("definitions"),
            mappings: PathBuf::from("mappings"),
            validation: PathBuf::from("validate_data"),
            required_data: PathBuf::from("required_data"),
            region_processing: RegionProcessingConfig::default(),
        }
    }
}

impl NomenclatureConfig {
    pub fn from_toml(content: &str, source: &str) -> NomenclatureResult<Self> {
        toml::from_str(content).map_err(|e| NomenclatureError::Parse {
            file: source.to_string(),
            details: e.to_string(),
        })
    }

    /// Read `nomenclature.toml` from a project folder, using defaults if it does not exist
    pub fn from_project(project: &Path) -> NomenclatureResult<Self> {
        let path = project.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::from_toml(&read_to_string(&path)?, &relative_path(&path))
    }

    pub fn to_toml(&self) -> NomenclatureResult<String> {
        toml::to_string(self).map_err(|e| NomenclatureError::Error(e.to_string()))
    }

    pub fn definitions_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.definitions)
    }

    pub fn mappings_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.mappings)
    }

    pub fn validation_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.validation)
    }

    pub fn required_data_dir(&self, project: &Path) -> PathBuf {
        project.join(&self.required_data)
    }
}
