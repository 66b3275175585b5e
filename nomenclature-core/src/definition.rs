//! The data structure definition: the codelists a dataset is validated against.

use crate::codelist::{RegionCodeList, VariableCodeList};
use crate::dataset::Dataset;
use crate::errors::{NomenclatureError, NomenclatureResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, error};

/// A dimension of the IAMC format backed by a codelist
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Region,
    Variable,
}

impl Dimension {
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Region => "region",
            Dimension::Variable => "variable",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codelists of a project.
///
/// Dimensions which are not loaded have an empty codelist and are not validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStructureDefinition {
    pub region: RegionCodeList,
    pub variable: VariableCodeList,
    pub dimensions: Vec<Dimension>,
}

impl DataStructureDefinition {
    pub fn new(region: RegionCodeList, variable: VariableCodeList) -> Self {
        Self {
            region,
            variable,
            dimensions: vec![Dimension::Region, Dimension::Variable],
        }
    }

    /// Load the codelists of `dimensions` from `<path>/<dimension>/`
    ///
    /// Errors of all dimensions are collected.
    pub fn from_directory(path: &Path, dimensions: &[Dimension]) -> NomenclatureResult<Self> {
        if !path.is_dir() {
            return Err(NomenclatureError::Error(format!(
                "Definitions directory not found: {}",
                path.display()
            )));
        }

        let mut dsd = Self {
            dimensions: dimensions.to_vec(),
            ..Self::default()
        };
        let mut errors = Vec::new();
        for dimension in dimensions {
            let dir = path.join(dimension.name());
            if !dir.is_dir() {
                errors.push(NomenclatureError::Error(format!(
                    "`definitions` directory is empty for dimension '{dimension}': {}",
                    dir.display()
                )));
                continue;
            }
            debug!(dimension = dimension.name(), dir = %dir.display(), "Loading codelist");
            let loaded = match dimension {
                Dimension::Region => RegionCodeList::from_directory(&dir).map(|r| dsd.region = r),
                Dimension::Variable => {
                    VariableCodeList::from_directory(&dir).map(|v| dsd.variable = v)
                }
            };
            if let Err(e) = loaded {
                errors.push(e);
            }
        }
        NomenclatureError::collect("when loading the DataStructureDefinition", errors)?;
        Ok(dsd)
    }

    pub fn has(&self, dimension: Dimension) -> bool {
        self.dimensions.contains(&dimension)
    }

    /// Check that `df` only uses defined regions, variables and units
    ///
    /// Only the `dimensions` which are part of this definition are checked. All failures are
    /// logged and returned together.
    pub fn validate(&self, df: &Dataset, dimensions: &[Dimension]) -> NomenclatureResult<()> {
        let mut errors = Vec::new();

        for dimension in dimensions.iter().filter(|d| self.has(**d)) {
            match dimension {
                Dimension::Region => {
                    let invalid = self.region.validate_items(df.regions());
                    if !invalid.is_empty() {
                        error!(dimension = "region", ?invalid, "Values not defined");
                        errors.push(NomenclatureError::NotDefined {
                            dimension: "region".to_string(),
                            invalid,
                        });
                    }
                }
                Dimension::Variable => {
                    let invalid = self.variable.validate_items(df.variables());
                    if !invalid.is_empty() {
                        error!(dimension = "variable", ?invalid, "Values not defined");
                        errors.push(NomenclatureError::NotDefined {
                            dimension: "variable".to_string(),
                            invalid,
                        });
                    }
                    errors.extend(self.validate_units(df));
                }
            }
        }
        NomenclatureError::collect("when validating the data", errors)
    }

    fn validate_units(&self, df: &Dataset) -> Vec<NomenclatureError> {
        let mut errors = Vec::new();
        for (variable, units) in df.units_by_variable() {
            let Some(code) = self.variable.get(variable) else {
                continue;
            };
            let found: Vec<String> = units
                .into_iter()
                .filter(|u| !code.unit.iter().any(|c| c.as_str() == *u))
                .map(|u| u.to_string())
                .collect();
            if !found.is_empty() {
                error!(variable, ?found, expected = ?code.unit, "Invalid unit");
                errors.push(NomenclatureError::InvalidUnit {
                    variable: variable.to_string(),
                    found,
                    expected: code.unit.clone(),
                });
            }
        }
        errors
    }

    /// Names of all defined regions
    pub fn region_names(&self) -> BTreeSet<&str> {
        self.region.names().collect()
    }
}
