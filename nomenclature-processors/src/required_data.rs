//! Checks that every scenario of a model reports a required set of data.
//!
//! ```yaml
//! description: Required variables for the intercomparison
//! model: [model_a]
//! required_data:
//!   - variable: [Primary Energy, Final Energy]
//!     region: World
//!     year: [2020, 2030]
//!   - measurand:
//!       - Emissions|CO2:
//!           unit: [Mt CO2/yr, Gt CO2/yr]
//! ```
//!
//! A measurand is satisfied if the variable is reported in any one of its units.

use nomenclature_core::dataset::{Dataset, Year};
use nomenclature_core::definition::{DataStructureDefinition, Dimension};
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use nomenclature_core::processor::Processor;
use nomenclature_core::utils::{one_or_many, read_to_string, relative_path, yaml_files};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::error;

/// Units of a measurand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasurandUnits {
    #[serde(default, deserialize_with = "one_or_many")]
    pub unit: Option<Vec<String>>,
}

impl MeasurandUnits {
    /// Allowed units, a missing unit meaning dimensionless
    pub fn units(&self) -> Vec<String> {
        match &self.unit {
            Some(units) if !units.is_empty() => units.clone(),
            _ => vec![String::new()],
        }
    }
}

/// One entry of `required_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurand: Option<Vec<BTreeMap<String, MeasurandUnits>>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub variable: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub region: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub year: Option<Vec<Year>>,
}

/// A required variable with the units it may be reported in (`None` for any unit)
#[derive(Debug, Clone, PartialEq)]
struct Requirement<'a> {
    variable: &'a str,
    units: Option<Vec<String>>,
}

impl RequiredData {
    fn check(&self) -> Result<(), String> {
        match (&self.measurand, &self.variable) {
            (Some(_), Some(_)) => Err("'measurand' and 'variable' cannot be used together".to_string()),
            (None, None) => Err("either 'measurand' or 'variable' must be given".to_string()),
            (Some(measurands), None) if measurands.iter().any(|m| m.len() != 1) => {
                Err("a measurand must be a single `variable: {unit: ...}` entry".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Names of the required variables
    pub fn variables(&self) -> Vec<&str> {
        self.requirements().into_iter().map(|r| r.variable).collect()
    }

    fn requirements(&self) -> Vec<Requirement<'_>> {
        match (&self.measurand, &self.variable) {
            (Some(measurands), _) => measurands
                .iter()
                .flatten()
                .map(|(variable, units)| Requirement {
                    variable,
                    units: Some(units.units()),
                })
                .collect(),
            (None, Some(variables)) => variables
                .iter()
                .map(|variable| Requirement {
                    variable,
                    units: None,
                })
                .collect(),
            (None, None) => vec![],
        }
    }

    /// Missing datapoints for one model and scenario
    fn missing(&self, df: &Dataset, model: &str, scenario: &str) -> Vec<MissingData> {
        let mut missing = Vec::new();
        for requirement in self.requirements() {
            let reported = |region: Option<&str>, year: Option<Year>| {
                df.keys().any(|k| {
                    k.model == model
                        && k.scenario == scenario
                        && k.variable == requirement.variable
                        && region.map_or(true, |r| k.region == r)
                        && year.map_or(true, |y| k.year == y)
                        && requirement
                            .units
                            .as_ref()
                            .map_or(true, |units| units.contains(&k.unit))
                })
            };

            let regions: Vec<Option<&str>> = match &self.region {
                Some(regions) => regions.iter().map(|r| Some(r.as_str())).collect(),
                None => vec![None],
            };
            let years: Vec<Option<Year>> = match &self.year {
                Some(years) => years.iter().map(|y| Some(*y)).collect(),
                None => vec![None],
            };
            for region in &regions {
                for year in &years {
                    if !reported(*region, *year) {
                        missing.push(MissingData {
                            scenario: scenario.to_string(),
                            variable: requirement.variable.to_string(),
                            units: requirement.units.clone().unwrap_or_default(),
                            region: region.map(|r| r.to_string()),
                            year: *year,
                        });
                    }
                }
            }
        }
        missing
    }
}

/// A requirement not met by a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct MissingData {
    pub scenario: String,
    pub variable: String,
    pub units: Vec<String>,
    pub region: Option<String>,
    pub year: Option<Year>,
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario: {}, variable: {}", self.scenario, self.variable)?;
        if !self.units.is_empty() {
            write!(f, ", unit: {}", self.units.join(","))?;
        }
        if let Some(region) = &self.region {
            write!(f, ", region: {region}")?;
        }
        if let Some(year) = self.year {
            write!(f, ", year: {year}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequiredDataInput {
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    model: Option<Vec<String>>,
    required_data: Vec<RequiredData>,
}

/// Processor failing if a model's scenarios do not report the required data.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredDataValidator {
    pub description: Option<String>,
    /// Models to check, all models if not set
    pub model: Option<Vec<String>>,
    pub required_data: Vec<RequiredData>,
    file: String,
}

impl RequiredDataValidator {
    pub fn from_yaml_str(content: &str, file: &str) -> NomenclatureResult<Self> {
        let input: RequiredDataInput =
            serde_yaml::from_str(content).map_err(|e| NomenclatureError::Parse {
                file: file.to_string(),
                details: e.to_string(),
            })?;

        let errors = input
            .required_data
            .iter()
            .enumerate()
            .filter_map(|(i, data)| {
                data.check().err().map(|reason| NomenclatureError::Parse {
                    file: file.to_string(),
                    details: format!("entry nr. {}: {reason}", i + 1),
                })
            })
            .collect();
        NomenclatureError::collect(format!("in file '{file}'"), errors)?;

        Ok(Self {
            description: input.description,
            model: input.model,
            required_data: input.required_data,
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
        NomenclatureError::collect("in the required-data files", errors)?;
        Ok(validators)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Missing data per model, only listing models with missing data
    pub fn check(&self, df: &Dataset) -> BTreeMap<String, Vec<MissingData>> {
        let mut missing = BTreeMap::new();
        for model in df.models() {
            if self
                .model
                .as_ref()
                .is_some_and(|models| !models.iter().any(|m| m == model))
            {
                continue;
            }
            let scenarios: BTreeSet<&str> = df
                .keys()
                .filter(|k| k.model == model)
                .map(|k| k.scenario.as_str())
                .collect();
            let model_missing: Vec<MissingData> = scenarios
                .into_iter()
                .flat_map(|scenario| {
                    self.required_data
                        .iter()
                        .flat_map(move |data| data.missing(df, model, scenario))
                })
                .collect();
            if !model_missing.is_empty() {
                missing.insert(model.to_string(), model_missing);
            }
        }
        missing
    }
}

impl Processor for RequiredDataValidator {
    fn name(&self) -> &str {
        "required-data"
    }

    fn validate_with_definition(&self, dsd: &DataStructureDefinition) -> NomenclatureResult<()> {
        let mut errors = Vec::new();
        for data in &self.required_data {
            if dsd.has(Dimension::Region) {
                let regions = data.region.iter().flatten().map(|r| r.as_str());
                let invalid = dsd.region.validate_items(regions);
                if !invalid.is_empty() {
                    errors.push(NomenclatureError::NotDefined {
                        dimension: "region".to_string(),
                        invalid,
                    });
                }
            }
            if !dsd.has(Dimension::Variable) {
                continue;
            }
            let invalid = dsd.variable.validate_items(data.variables());
            if !invalid.is_empty() {
                errors.push(NomenclatureError::NotDefined {
                    dimension: "variable".to_string(),
                    invalid,
                });
            }
            for requirement in data.requirements() {
                let (Some(code), Some(units)) =
                    (dsd.variable.get(requirement.variable), requirement.units)
                else {
                    continue;
                };
                let found: Vec<String> = units
                    .into_iter()
                    .filter(|u| !code.unit.contains(u))
                    .collect();
                if !found.is_empty() {
                    errors.push(NomenclatureError::InvalidUnit {
                        variable: requirement.variable.to_string(),
                        found,
                        expected: code.unit.clone(),
                    });
                }
            }
        }
        NomenclatureError::collect(format!("in file '{}'", self.file), errors)
    }

    fn apply(&self, df: &Dataset) -> NomenclatureResult<Dataset> {
        let missing = self.check(df);
        if missing.is_empty() {
            return Ok(df.clone());
        }
        for (model, entries) in &missing {
            for entry in entries {
                error!(file = %self.file, %model, missing = %entry, "Missing required data");
            }
        }
        Err(NomenclatureError::RequiredDataMissing {
            models: missing.into_keys().collect(),
            file: self.file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomenclature_core::codelist::{RegionCodeList, VariableCode, VariableCodeList};
    use nomenclature_core::dataset::DataKey;

    const REQUIRED: &str = r#"
description: Required variables
model: [model_a, model_b]
required_data:
  - variable: Primary Energy
    region: World
    year: [2020, 2030]
  - measurand:
      - Emissions|CO2:
          unit: [Mt CO2/yr, Gt CO2/yr]
"#;

    fn df() -> Dataset {
        Dataset::from_points([
            (DataKey::new("model_a", "s1", "World", "Primary Energy", "EJ/yr", 2020), 1.0),
            (DataKey::new("model_a", "s1", "World", "Primary Energy", "EJ/yr", 2030), 1.0),
            (DataKey::new("model_a", "s1", "World", "Emissions|CO2", "Gt CO2/yr", 2020), 1.0),
            (DataKey::new("model_a", "s2", "World", "Primary Energy", "EJ/yr", 2020), 1.0),
            (DataKey::new("model_a", "s2", "World", "Emissions|CO2", "kt CO2/yr", 2020), 1.0),
            (DataKey::new("model_c", "s1", "World", "Final Energy", "EJ/yr", 2020), 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse() {
        let validator = RequiredDataValidator::from_yaml_str(REQUIRED, "required.yaml").unwrap();
        assert_eq!(validator.required_data.len(), 2);
        assert_eq!(
            validator.required_data[1].variables(),
            vec!["Emissions|CO2"]
        );
        assert_eq!(validator.model.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_entries() {
        let err = RequiredDataValidator::from_yaml_str(
            "required_data:\n  - region: World\n  - variable: A\n    measurand:\n      - A: {unit: EJ/yr}\n",
            "required.yaml",
        )
        .unwrap_err();
        assert_eq!(err.errors().len(), 2);
        assert!(err.to_string().contains("entry nr. 2"));
    }

    #[test]
    fn test_check() {
        let validator = RequiredDataValidator::from_yaml_str(REQUIRED, "required.yaml").unwrap();
        let missing = validator.check(&df());
        // model_c is not checked
        assert_eq!(missing.keys().collect::<Vec<_>>(), vec!["model_a"]);

        let entries = &missing["model_a"];
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].scenario, "s2");
        assert_eq!(entries[0].variable, "Primary Energy");
        assert_eq!(entries[0].year, Some(2030));
        assert_eq!(entries[1].variable, "Emissions|CO2");
        assert_eq!(
            entries[1].to_string(),
            "scenario: s2, variable: Emissions|CO2, unit: Mt CO2/yr,Gt CO2/yr"
        );

        match validator.apply(&df()) {
            Err(NomenclatureError::RequiredDataMissing { models, .. }) => {
                assert_eq!(models, vec!["model_a"])
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_validate_with_definition() {
        let validator = RequiredDataValidator::from_yaml_str(REQUIRED, "required.yaml").unwrap();
        let dsd = DataStructureDefinition::new(
            RegionCodeList::from_names("common", &["World"]).unwrap(),
            VariableCodeList::from_codes([
                VariableCode::new("Primary Energy", "EJ/yr"),
                VariableCode::new("Emissions|CO2", "Mt CO2/yr"),
            ])
            .unwrap(),
        );
        match validator.validate_with_definition(&dsd) {
            Err(NomenclatureError::InvalidUnit { variable, found, .. }) => {
                assert_eq!(variable, "Emissions|CO2");
                assert_eq!(found, vec!["Gt CO2/yr"]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
