//! Validation of datapoint values against bounds or reference values.
//!
//! A validation file is a list of criteria. Each criterion selects datapoints with the
//! usual IAMC filter arguments and either bounds their value or compares it with a
//! reference value:
//!
//! ```yaml
//! - variable: Primary Energy
//!   region: World
//!   upper_bound: 1000
//!   lower_bound: 0
//! - variable: Final Energy
//!   year: 2020
//!   value: 400
//!   rtol: 0.1
//! ```

use nomenclature_core::dataset::{DataFilter, DataKey, Dataset, FloatValue};
use nomenclature_core::definition::{DataStructureDefinition, Dimension};
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use nomenclature_core::processor::Processor;
use nomenclature_core::utils::{read_to_string, relative_path, yaml_files};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::error;

/// Check applied to the value of every selected datapoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    Bounds {
        lower: Option<FloatValue>,
        upper: Option<FloatValue>,
    },
    Value {
        value: FloatValue,
        rtol: FloatValue,
        atol: FloatValue,
    },
}

impl Criterion {
    pub fn is_satisfied(&self, x: FloatValue) -> bool {
        match *self {
            Criterion::Bounds { lower, upper } => {
                lower.map_or(true, |l| x >= l) && upper.map_or(true, |u| x <= u)
            }
            Criterion::Value { value, rtol, atol } => {
                (x - value).abs() <= atol + rtol * value.abs()
            }
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Bounds { lower, upper } => {
                let bound = |b: &Option<FloatValue>| b.map_or("-".to_string(), |b| b.to_string());
                write!(f, "lower_bound: {}, upper_bound: {}", bound(lower), bound(upper))
            }
            Criterion::Value { value, rtol, atol } => {
                write!(f, "value: {value}, rtol: {rtol}, atol: {atol}")
            }
        }
    }
}

/// One entry of a validation file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationCriteria {
    #[serde(flatten)]
    pub filter: DataFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<FloatValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<FloatValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FloatValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtol: Option<FloatValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atol: Option<FloatValue>,
}

impl DataValidationCriteria {
    pub fn criterion(&self) -> Result<Criterion, String> {
        let has_bounds = self.upper_bound.is_some() || self.lower_bound.is_some();
        let has_tolerance = self.rtol.is_some() || self.atol.is_some();
        match (has_bounds, self.value) {
            (true, Some(_)) => Err("bounds and 'value' cannot be used together".to_string()),
            (true, None) if has_tolerance => {
                Err("'rtol' and 'atol' can only be used with 'value'".to_string())
            }
            (true, None) => Ok(Criterion::Bounds {
                lower: self.lower_bound,
                upper: self.upper_bound,
            }),
            (false, Some(value)) => Ok(Criterion::Value {
                value,
                rtol: self.rtol.unwrap_or(0.0),
                atol: self.atol.unwrap_or(0.0),
            }),
            (false, None) => {
                Err("one of 'upper_bound', 'lower_bound' or 'value' must be given".to_string())
            }
        }
    }
}

/// Processor failing on datapoints that violate any validation criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValidator {
    criteria: Vec<(DataValidationCriteria, Criterion)>,
    file: String,
}

impl DataValidator {
    pub fn from_yaml_str(content: &str, file: &str) -> NomenclatureResult<Self> {
        let items: Vec<DataValidationCriteria> =
            serde_yaml::from_str(content).map_err(|e| NomenclatureError::Parse {
                file: file.to_string(),
                details: e.to_string(),
            })?;

        let mut criteria = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            match item.criterion() {
                Ok(criterion) => criteria.push((item, criterion)),
                Err(reason) => errors.push(NomenclatureError::Parse {
                    file: file.to_string(),
                    details: format!("criteria nr. {}: {reason}", i + 1),
                }),
            }
        }
        NomenclatureError::collect(format!("in file '{file}'"), errors)?;
        Ok(Self {
            criteria,
            file: file.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> NomenclatureResult<Self> {
        Self::from_yaml_str(&read_to_string(path)?, &relative_path(path))
    }

    /// One validator per YAML file in `dir`, collecting errors of all files
    pub fn from_directory(dir: &Path) -> NomenclatureResult<Vec<Self>> {
        let mut validators = Vec::new();
        let mut errors = Vec::new();
        for file in yaml_files(dir)? {
            match Self::from_file(&file) {
                Ok(validator) => validators.push(validator),
                Err(e) => errors.push(e),
            }
        }
        NomenclatureError::collect("in the data validation files", errors)?;
        Ok(validators)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn criteria(&self) -> impl Iterator<Item = &DataValidationCriteria> {
        self.criteria.iter().map(|(c, _)| c)
    }

    /// Datapoints violating a criterion, with the criterion they violate
    pub fn failing<'a>(&'a self, df: &'a Dataset) -> Vec<(&'a DataKey, FloatValue, &'a Criterion)> {
        let mut failing = Vec::new();
        for (item, criterion) in &self.criteria {
            failing.extend(
                df.iter()
                    .filter(|(key, value)| item.filter.matches(key) && !criterion.is_satisfied(**value))
                    .map(|(key, value)| (key, *value, criterion)),
            );
        }
        failing
    }
}

impl Processor for DataValidator {
    fn name(&self) -> &str {
        "data-validation"
    }

    fn validate_with_definition(&self, dsd: &DataStructureDefinition) -> NomenclatureResult<()> {
        let mut errors = Vec::new();
        for (item, _) in &self.criteria {
            for (dimension, values) in item.filter.criteria() {
                // wildcard patterns cannot be checked against the codelist
                let values = values.iter().filter(|v| !v.contains('*')).map(|v| v.as_str());
                let invalid = match dimension {
                    "region" if dsd.has(Dimension::Region) => dsd.region.validate_items(values),
                    "variable" if dsd.has(Dimension::Variable) => {
                        dsd.variable.validate_items(values)
                    }
                    _ => continue,
                };
                if !invalid.is_empty() {
                    errors.push(NomenclatureError::NotDefined {
                        dimension: dimension.to_string(),
                        invalid,
                    });
                }
            }
        }
        NomenclatureError::collect(format!("in file '{}'", self.file), errors)
    }

    fn apply(&self, df: &Dataset) -> NomenclatureResult<Dataset> {
        let failing = self.failing(df);
        if failing.is_empty() {
            return Ok(df.clone());
        }
        for (key, value, criterion) in &failing {
            error!(file = %self.file, datapoint = %key, value, %criterion, "Failed data validation");
        }
        Err(NomenclatureError::DataValidationFailed {
            count: failing.len(),
            file: self.file.clone(),
        })
    }
}
