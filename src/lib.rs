//! Validation and region processing of IAMC-format scenario data.
//!
//! The building blocks live in [`nomenclature_core`] (datasets, codelists, configuration)
//! and [`nomenclature_processors`] (region processing and validators). [`Project`] wires
//! them together for a project folder:
//!
//! ```text
//! project/
//!   nomenclature.toml      optional, see `NomenclatureConfig`
//!   definitions/
//!     region/*.yaml
//!     variable/*.yaml
//!     meta/*.yaml          optional
//!   mappings/*.yaml|csv    optional
//!   validate_data/*.yaml   optional
//!   required_data/*.yaml   optional
//! ```

pub use nomenclature_core;
pub use nomenclature_processors;

pub use nomenclature_core::codelist::{VariableCode, VariableCodeList};
pub use nomenclature_core::config::NomenclatureConfig;
pub use nomenclature_core::dataset::{DataKey, Dataset};
pub use nomenclature_core::definition::{DataStructureDefinition, Dimension};
pub use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
pub use nomenclature_core::io::{read_csv, write_csv};
pub use nomenclature_core::processor::{process, Processor};
pub use nomenclature_core::utils::validate_yaml;
pub use nomenclature_processors::region::{DifferenceReport, RegionProcessor, Tolerance};
pub use nomenclature_processors::{DataValidator, MetaValidator, RequiredDataValidator};

use std::path::{Path, PathBuf};
use tracing::info;

/// Folder of the meta indicator codelist below the definitions folder
const META_FOLDER: &str = "meta";

/// Definitions and processors of a project folder
#[derive(Debug, Clone)]
pub struct Project {
    pub path: PathBuf,
    pub config: NomenclatureConfig,
    pub definition: DataStructureDefinition,
    pub region_processor: Option<RegionProcessor>,
    pub meta_validator: Option<MetaValidator>,
    pub data_validators: Vec<DataValidator>,
    pub required_data: Vec<RequiredDataValidator>,
}

impl Project {
    /// Load a project folder.
    ///
    /// Optional folders which do not exist are skipped. Errors of the definitions, the
    /// mappings and the validation files are collected and returned together.
    pub fn load(path: &Path) -> NomenclatureResult<Self> {
        let config = NomenclatureConfig::from_project(path)?;
        let definition = DataStructureDefinition::from_directory(
            &config.definitions_dir(path),
            &config.dimensions,
        )?;
        info!(
            regions = definition.region.len(),
            variables = definition.variable.len(),
            "Loaded definitions"
        );

        let mut errors = Vec::new();
        let mut project = Self {
            path: path.to_path_buf(),
            config,
            definition,
            region_processor: None,
            meta_validator: None,
            data_validators: vec![],
            required_data: vec![],
        };

        let mappings = project.config.mappings_dir(path);
        if mappings.is_dir() {
            match RegionProcessor::from_directory(
                &mappings,
                project.definition.clone(),
                Tolerance::from(&project.config.region_processing),
            ) {
                Ok(processor) => {
                    info!(models = processor.repository().len(), "Loaded region mappings");
                    project.region_processor = Some(processor);
                }
                Err(e) => errors.push(e),
            }
        }

        let meta = project.config.definitions_dir(path).join(META_FOLDER);
        if meta.is_dir() {
            match MetaValidator::from_directory(&meta) {
                Ok(validator) => project.meta_validator = Some(validator),
                Err(e) => errors.push(e),
            }
        }

        let validation = project.config.validation_dir(path);
        if validation.is_dir() {
            match DataValidator::from_directory(&validation) {
                Ok(validators) => project.data_validators = validators,
                Err(e) => errors.push(e),
            }
        }

        let required_data = project.config.required_data_dir(path);
        if required_data.is_dir() {
            match RequiredDataValidator::from_directory(&required_data) {
                Ok(validators) => project.required_data = validators,
                Err(e) => errors.push(e),
            }
        }

        NomenclatureError::collect(format!("in project '{}'", path.display()), errors)?;
        Ok(project)
    }

    /// Replace the tolerance used when comparing aggregated with reported data
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.region_processor = self
            .region_processor
            .map(|processor| processor.with_tolerance(tolerance));
        self
    }

    /// Processors in the order they are applied
    pub fn processors(&self) -> Vec<&dyn Processor> {
        let mut processors: Vec<&dyn Processor> = Vec::new();
        if let Some(processor) = &self.region_processor {
            processors.push(processor);
        }
        if let Some(validator) = &self.meta_validator {
            processors.push(validator);
        }
        processors.extend(self.data_validators.iter().map(|v| v as &dyn Processor));
        processors.extend(self.required_data.iter().map(|v| v as &dyn Processor));
        processors
    }

    /// Check every processor against the definitions, collecting all errors
    pub fn validate(&self) -> NomenclatureResult<()> {
        let errors = self
            .processors()
            .into_iter()
            .filter_map(|p| p.validate_with_definition(&self.definition).err())
            .collect();
        NomenclatureError::collect("when validating the project", errors)
    }

    /// Validate and process a dataset with all processors of the project
    pub fn process(&self, df: &Dataset) -> NomenclatureResult<Dataset> {
        process(df, &self.definition, &self.processors())
    }
}

/// Variables of `df` that are not in the variable codelist of the project at `path`.
///
/// If `target_file` is given, the missing variables are written as a codelist file of that
/// name to the variable definitions folder.
pub fn list_missing_variables(
    path: &Path,
    df: &Dataset,
    target_file: Option<&str>,
) -> NomenclatureResult<Vec<VariableCode>> {
    let config = NomenclatureConfig::from_project(path)?;
    let dir = config
        .definitions_dir(path)
        .join(Dimension::Variable.name());
    let missing = VariableCodeList::from_directory(&dir)?.missing_variables(df);
    info!(count = missing.len(), "Variables not in the codelist");

    if let Some(target_file) = target_file {
        let target = dir.join(target_file);
        std::fs::write(&target, VariableCodeList::to_yaml(&missing)?).map_err(|source| {
            NomenclatureError::Io {
                path: target.clone(),
                source,
            }
        })?;
        info!(path = %target.display(), "Wrote missing variables");
    }
    Ok(missing)
}
