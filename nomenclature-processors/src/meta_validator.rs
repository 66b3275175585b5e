//! Validation of scenario meta indicators against their allowed values.
//!
//! ```yaml
//! - exclude:
//!     description: Whether the scenario is excluded from the analysis
//!     allowed_values: [true, false]
//! - Category:
//!     allowed_values: [C1, C2, C3]
//! ```

use nomenclature_core::dataset::Dataset;
use nomenclature_core::definition::DataStructureDefinition;
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use nomenclature_core::processor::Processor;
use nomenclature_core::utils::{read_to_string, relative_path, yaml_files};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaCode {
    #[serde(default)]
    pub description: Option<String>,
    pub allowed_values: Vec<serde_yaml::Value>,
}

impl MetaCode {
    /// Allowed values as they appear in the meta table
    pub fn allowed(&self) -> Vec<String> {
        self.allowed_values.iter().filter_map(display_value).collect()
    }
}

fn display_value(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Processor checking that every meta indicator is defined and only takes allowed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaValidator {
    codes: BTreeMap<String, MetaCode>,
}

impl MetaValidator {
    pub fn from_yaml_str(content: &str, file: &str) -> NomenclatureResult<Self> {
        let mut validator = Self::default();
        validator.register(content, file)?;
        Ok(validator)
    }

    /// Meta codes of all YAML files in `dir`
    pub fn from_directory(dir: &Path) -> NomenclatureResult<Self> {
        let mut validator = Self::default();
        let mut errors = Vec::new();
        for file in yaml_files(dir)? {
            let registered = read_to_string(&file)
                .and_then(|content| validator.register(&content, &relative_path(&file)));
            if let Err(e) = registered {
                errors.push(e);
            }
        }
        NomenclatureError::collect("in the meta definitions", errors)?;
        Ok(validator)
    }

    fn register(&mut self, content: &str, file: &str) -> NomenclatureResult<()> {
        let items: Vec<BTreeMap<String, MetaCode>> =
            serde_yaml::from_str(content).map_err(|e| NomenclatureError::Parse {
                file: file.to_string(),
                details: e.to_string(),
            })?;
        for (name, code) in items.into_iter().flatten() {
            if self.codes.contains_key(&name) {
                return Err(NomenclatureError::DuplicateCode {
                    codelist: "meta".to_string(),
                    code: name,
                });
            }
            self.codes.insert(name, code);
        }
        Ok(())
    }

    pub fn get(&self, indicator: &str) -> Option<&MetaCode> {
        self.codes.get(indicator)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Processor for MetaValidator {
    fn name(&self) -> &str {
        "meta-validation"
    }

    fn validate_with_definition(&self, _dsd: &DataStructureDefinition) -> NomenclatureResult<()> {
        Ok(())
    }

    fn apply(&self, df: &Dataset) -> NomenclatureResult<Dataset> {
        let mut unknown = BTreeSet::new();
        let mut invalid: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for ((model, scenario), indicators) in df.meta_table() {
            for (indicator, value) in indicators {
                match self.codes.get(indicator) {
                    None => {
                        unknown.insert(indicator.clone());
                    }
                    Some(code) if !code.allowed().contains(value) => {
                        error!(%model, %scenario, %indicator, %value, "Meta indicator value not allowed");
                        invalid.entry(indicator).or_default().insert(value);
                    }
                    Some(_) => {}
                }
            }
        }

        let mut errors: Vec<NomenclatureError> = invalid
            .into_iter()
            .map(|(indicator, values)| {
                NomenclatureError::Error(format!(
                    "{values:?} meta indicator value(s) in the '{indicator}' column are not \
                     allowed. Allowed values are {:?}",
                    self.codes.get(indicator).map(|c| c.allowed()).unwrap_or_default()
                ))
            })
            .collect();
        if !unknown.is_empty() {
            errors.push(NomenclatureError::NotDefined {
                dimension: "meta indicator".to_string(),
                invalid: unknown.into_iter().collect(),
            });
        }
        NomenclatureError::collect("in the meta indicators", errors)?;
        Ok(df.clone())
    }
}
