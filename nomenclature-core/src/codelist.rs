//! Codelists: the allowed values of the region and variable dimensions.
//!
//! Codelists are read from YAML files below `definitions/<dimension>/`.
//!
//! A variable codelist file is a list of single-entry mappings from the variable name
//! to its attributes:
//!
//! ```yaml
//! - Primary Energy:
//!     unit: EJ/yr
//!     description: Total primary energy supply
//! - Price|Carbon:
//!     unit: USD_2010/t CO2
//!     weight: Emissions|CO2
//! - Share|Renewables:
//!     unit: "%"
//!     skip-region-aggregation: true
//! ```
//!
//! A region codelist file is a list of hierarchies, each listing region names with
//! optional attributes:
//!
//! ```yaml
//! - common:
//!   - World
//! - R5:
//!   - R5ASIA
//!   - R5LAM: {iso3_codes: [BRA, MEX]}
//! ```

use crate::aggregation::{AggregationArgs, AggregationMethod};
use crate::dataset::Dataset;
use crate::errors::{NomenclatureError, NomenclatureResult};
use crate::utils::{read_to_string, relative_path, yaml_files};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

fn dimensionless() -> Vec<String> {
    vec![String::new()]
}

/// Units can be given as a single string, a list or null (dimensionless)
fn deserialize_units<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Units {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Units>::deserialize(deserializer)? {
        None => dimensionless(),
        Some(Units::One(unit)) => vec![unit],
        Some(Units::Many(units)) if units.is_empty() => dimensionless(),
        Some(Units::Many(units)) => units,
    })
}

/// A single unit is written as a plain string
fn serialize_units<S: Serializer>(units: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    match units {
        [unit] => serializer.serialize_str(unit),
        _ => units.serialize(serializer),
    }
}

/// A named variant of a variable produced by region aggregation with its own arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RenameTarget {
    pub name: String,
    pub args: AggregationArgs,
}

/// Region-aggregation arguments of a variable with a non-default aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedAggregation {
    pub args: AggregationArgs,
    /// If not empty, the variable is aggregated once per target instead of under its own name
    pub targets: Vec<RenameTarget>,
}

/// How a variable is treated by region aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationPolicy {
    /// Sum over the constituent regions
    Default,
    Weighted(WeightedAggregation),
    Skip,
}

/// A variable definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VariableCode {
    #[serde(skip)]
    pub name: String,
    #[serde(
        default = "dimensionless",
        deserialize_with = "deserialize_units",
        serialize_with = "serialize_units"
    )]
    pub unit: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_region_aggregation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AggregationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_negative_weights: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_aggregation: Option<Vec<BTreeMap<String, AggregationArgs>>>,
    /// Any other attribute, kept as-is
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_yaml::Value>,
    #[serde(skip)]
    pub file: String,
}

impl VariableCode {
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: vec![unit.to_string()],
            description: None,
            skip_region_aggregation: false,
            weight: None,
            method: None,
            components: None,
            drop_negative_weights: None,
            region_aggregation: None,
            attributes: BTreeMap::new(),
            file: String::new(),
        }
    }

    /// Aggregation arguments declared directly on the variable
    pub fn aggregation_args(&self) -> AggregationArgs {
        AggregationArgs {
            weight: self.weight.clone(),
            method: self.method,
            components: self.components.clone(),
            drop_negative_weights: self.drop_negative_weights,
        }
    }

    /// Targets of the `region-aggregation` attribute, in declaration order
    pub fn rename_targets(&self) -> Vec<RenameTarget> {
        self.region_aggregation
            .iter()
            .flatten()
            .flat_map(|entry| entry.iter())
            .map(|(name, args)| RenameTarget {
                name: name.clone(),
                args: args.clone(),
            })
            .collect()
    }

    pub fn policy(&self) -> AggregationPolicy {
        if self.skip_region_aggregation {
            return AggregationPolicy::Skip;
        }
        let args = self.aggregation_args();
        let targets = self.rename_targets();
        if args.is_empty() && targets.is_empty() {
            AggregationPolicy::Default
        } else {
            AggregationPolicy::Weighted(WeightedAggregation { args, targets })
        }
    }
}

/// All defined variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableCodeList {
    codes: BTreeMap<String, VariableCode>,
}

impl VariableCodeList {
    /// Build a codelist from codes, checking duplicates and aggregation settings
    pub fn from_codes<I: IntoIterator<Item = VariableCode>>(codes: I) -> NomenclatureResult<Self> {
        let mut codelist = Self::default();
        let mut errors = Vec::new();
        for code in codes {
            if let Err(e) = codelist.add(code) {
                errors.push(e);
            }
        }
        NomenclatureError::collect("in the variable codelist", errors)?;
        codelist.validate()?;
        Ok(codelist)
    }

    /// Load all variable definitions below `dir`
    pub fn from_directory(dir: &Path) -> NomenclatureResult<Self> {
        let mut codes = Vec::new();
        let mut errors = Vec::new();
        for file in yaml_files(dir)? {
            match read_to_string(&file)
                .and_then(|content| Self::parse(&content, &relative_path(&file)))
            {
                Ok(parsed) => codes.extend(parsed),
                Err(e) => errors.push(e),
            }
        }
        NomenclatureError::collect("when reading the variable codelist", errors)?;
        Self::from_codes(codes)
    }

    /// Parse the codes of a single YAML document; `source` is recorded on every code
    pub fn parse(content: &str, source: &str) -> NomenclatureResult<Vec<VariableCode>> {
        let entries: Vec<BTreeMap<String, VariableCode>> =
            serde_yaml::from_str(content).map_err(|e| NomenclatureError::Parse {
                file: source.to_string(),
                details: e.to_string(),
            })?;
        Ok(entries
            .into_iter()
            .flatten()
            .map(|(name, mut code)| {
                code.name = name;
                code.file = source.to_string();
                code
            })
            .collect())
    }

    fn add(&mut self, code: VariableCode) -> NomenclatureResult<()> {
        if self.codes.contains_key(&code.name) {
            return Err(NomenclatureError::DuplicateCode {
                codelist: "variable".to_string(),
                code: code.name,
            });
        }
        self.codes.insert(code.name.clone(), code);
        Ok(())
    }

    /// Check weights, rename targets and argument combinations, collecting all errors
    pub fn validate(&self) -> NomenclatureResult<()> {
        let mut errors = Vec::new();
        for (name, code) in &self.codes {
            let targets = code.rename_targets();
            let parent = code.aggregation_args();

            let missing: Vec<String> = std::iter::once(&parent)
                .chain(targets.iter().map(|t| &t.args))
                .filter_map(|args| args.weight.clone())
                .filter(|w| !self.contains(w))
                .collect();
            if !missing.is_empty() {
                errors.push(NomenclatureError::MissingWeight {
                    variable: name.clone(),
                    missing,
                });
            }

            let undefined: Vec<String> = targets
                .iter()
                .filter(|t| !self.contains(&t.name))
                .map(|t| t.name.clone())
                .collect();
            if !undefined.is_empty() {
                errors.push(NomenclatureError::UndefinedRenameTarget {
                    variable: name.clone(),
                    targets: undefined,
                });
            }

            if targets.is_empty() {
                if let Err(e) = parent.validate(name) {
                    errors.push(e);
                }
            }
            for target in &targets {
                if let Err(e) = parent.merged_with(&target.args).validate(&target.name) {
                    errors.push(e);
                }
            }
        }
        NomenclatureError::collect("in the variable codelist", errors)
    }

    pub fn get(&self, name: &str) -> Option<&VariableCode> {
        self.codes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Variables reported in `df` which are not in the codelist, with the units they use
    pub fn missing_variables(&self, df: &Dataset) -> Vec<VariableCode> {
        df.units_by_variable()
            .into_iter()
            .filter(|(variable, _)| !self.contains(variable))
            .map(|(variable, units)| VariableCode {
                unit: units.into_iter().map(|u| u.to_string()).collect(),
                ..VariableCode::new(variable, "")
            })
            .collect()
    }

    /// Codes in the YAML format of a codelist file
    pub fn to_yaml(codes: &[VariableCode]) -> NomenclatureResult<String> {
        let entries: Vec<BTreeMap<&str, &VariableCode>> = codes
            .iter()
            .map(|code| BTreeMap::from([(code.name.as_str(), code)]))
            .collect();
        serde_yaml::to_string(&entries).map_err(|e| NomenclatureError::Error(e.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableCode)> {
        self.codes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Items which are not defined in this codelist
    pub fn validate_items<'a, I: IntoIterator<Item = &'a str>>(&self, items: I) -> Vec<String> {
        items
            .into_iter()
            .filter(|i| !self.contains(i))
            .map(|i| i.to_string())
            .collect()
    }
}

/// A region definition.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCode {
    pub name: String,
    pub hierarchy: String,
    pub attributes: BTreeMap<String, serde_yaml::Value>,
    pub file: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegionEntry {
    Name(String),
    WithAttributes(BTreeMap<String, Option<BTreeMap<String, serde_yaml::Value>>>),
}

/// All defined regions, grouped by hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCodeList {
    codes: BTreeMap<String, RegionCode>,
}

impl RegionCodeList {
    /// Build a codelist from codes, failing on duplicate names
    pub fn from_codes<I: IntoIterator<Item = RegionCode>>(codes: I) -> NomenclatureResult<Self> {
        let mut errors = Vec::new();
        let mut list = Self::default();
        for code in codes {
            if list.codes.contains_key(&code.name) {
                errors.push(NomenclatureError::DuplicateCode {
                    codelist: "region".to_string(),
                    code: code.name,
                });
            } else {
                list.codes.insert(code.name.clone(), code);
            }
        }
        NomenclatureError::collect("in the region codelist", errors)?;
        Ok(list)
    }

    /// Regions without attributes, all in one hierarchy
    pub fn from_names<S: AsRef<str>>(hierarchy: &str, names: &[S]) -> NomenclatureResult<Self> {
        Self::from_codes(names.iter().map(|n| RegionCode {
            name: n.as_ref().to_string(),
            hierarchy: hierarchy.to_string(),
            attributes: BTreeMap::new(),
            file: String::new(),
        }))
    }

    /// Load all region definitions below `dir`
    pub fn from_directory(dir: &Path) -> NomenclatureResult<Self> {
        let mut codes = Vec::new();
        let mut errors = Vec::new();
        for file in yaml_files(dir)? {
            match read_to_string(&file)
                .and_then(|content| Self::parse(&content, &relative_path(&file)))
            {
                Ok(parsed) => codes.extend(parsed),
                Err(e) => errors.push(e),
            }
        }
        NomenclatureError::collect("when reading the region codelist", errors)?;
        Self::from_codes(codes)
    }

    /// Parse the regions of a single YAML document
    pub fn parse(content: &str, source: &str) -> NomenclatureResult<Vec<RegionCode>> {
        let hierarchies: Vec<BTreeMap<String, Vec<RegionEntry>>> = serde_yaml::from_str(content)
            .map_err(|e| NomenclatureError::Parse {
                file: source.to_string(),
                details: e.to_string(),
            })?;

        let mut codes = Vec::new();
        for (hierarchy, entries) in hierarchies.into_iter().flatten() {
            for entry in entries {
                let named: Vec<(String, BTreeMap<String, serde_yaml::Value>)> = match entry {
                    RegionEntry::Name(name) => vec![(name, BTreeMap::new())],
                    RegionEntry::WithAttributes(map) => map
                        .into_iter()
                        .map(|(name, attrs)| (name, attrs.unwrap_or_default()))
                        .collect(),
                };
                codes.extend(named.into_iter().map(|(name, attributes)| RegionCode {
                    name,
                    hierarchy: hierarchy.clone(),
                    attributes,
                    file: source.to_string(),
                }));
            }
        }
        Ok(codes)
    }

    pub fn get(&self, name: &str) -> Option<&RegionCode> {
        self.codes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(|k| k.as_str())
    }

    pub fn hierarchies(&self) -> BTreeSet<&str> {
        self.codes.values().map(|c| c.hierarchy.as_str()).collect()
    }

    /// Items which are not defined in this codelist
    pub fn validate_items<'a, I: IntoIterator<Item = &'a str>>(&self, items: I) -> Vec<String> {
        items
            .into_iter()
            .filter(|i| !self.contains(i))
            .map(|i| i.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIABLES: &str = r#"
- Primary Energy:
    unit: EJ/yr
    description: Total primary energy supply
    tier: 1
- Emissions|CO2:
    unit: [Mt CO2/yr, Gt CO2/yr]
- Price|Carbon:
    unit: USD_2010/t CO2
    weight: Emissions|CO2
- Share|Renewables:
    unit:
    skip-region-aggregation: true
- Temperature:
    unit: K
    region-aggregation:
      - Temperature (Max):
          method: max
      - Temperature (Mean):
          method: mean
- Temperature (Max):
    unit: K
- Temperature (Mean):
    unit: K
"#;

    fn codelist() -> VariableCodeList {
        VariableCodeList::from_codes(VariableCodeList::parse(VARIABLES, "variables.yaml").unwrap())
            .unwrap()
    }

    #[test]
    fn test_parse_variables() {
        let codelist = codelist();
        assert_eq!(codelist.len(), 7);

        let code = codelist.get("Primary Energy").unwrap();
        assert_eq!(code.unit, vec!["EJ/yr"]);
        assert_eq!(code.file, "variables.yaml");
        assert_eq!(code.attributes.get("tier").and_then(|v| v.as_i64()), Some(1));

        assert_eq!(codelist.get("Emissions|CO2").unwrap().unit.len(), 2);
        assert_eq!(codelist.get("Share|Renewables").unwrap().unit, vec![""]);
    }

    #[test]
    fn test_policies() {
        let codelist = codelist();
        assert_eq!(
            codelist.get("Primary Energy").unwrap().policy(),
            AggregationPolicy::Default
        );
        assert_eq!(
            codelist.get("Share|Renewables").unwrap().policy(),
            AggregationPolicy::Skip
        );
        match codelist.get("Price|Carbon").unwrap().policy() {
            AggregationPolicy::Weighted(w) => {
                assert_eq!(w.args.weight.as_deref(), Some("Emissions|CO2"));
                assert!(w.targets.is_empty());
            }
            other => panic!("unexpected policy {other:?}"),
        }
        match codelist.get("Temperature").unwrap().policy() {
            AggregationPolicy::Weighted(w) => {
                let names: Vec<_> = w.targets.iter().map(|t| t.name.as_str()).collect();
                assert_eq!(names, vec!["Temperature (Max)", "Temperature (Mean)"]);
                assert_eq!(w.targets[0].args.method, Some(AggregationMethod::Max));
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn test_missing_weight_and_target() {
        let content = r#"
- Price|Carbon:
    unit: USD_2010/t CO2
    weight: Emissions|CO2
- Temperature:
    unit: K
    region-aggregation:
      - Temperature (Max):
          method: max
"#;
        let err =
            VariableCodeList::from_codes(VariableCodeList::parse(content, "v.yaml").unwrap())
                .unwrap_err();
        let errors = err.errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], NomenclatureError::MissingWeight { .. }));
        assert!(matches!(
            errors[1],
            NomenclatureError::UndefinedRenameTarget { .. }
        ));
    }

    #[test]
    fn test_invalid_args() {
        let content = r#"
- Population:
    unit: million
- Price|Carbon:
    unit: USD_2010/t CO2
    weight: Population
    method: max
"#;
        let err =
            VariableCodeList::from_codes(VariableCodeList::parse(content, "v.yaml").unwrap())
                .unwrap_err();
        assert!(matches!(
            err,
            NomenclatureError::InvalidAggregationArgs { .. }
        ));
    }

    #[test]
    fn test_duplicate_variable() {
        let codes = VariableCodeList::parse("- A:\n    unit: EJ/yr\n- A:\n    unit: EJ/yr", "v.yaml")
            .unwrap();
        assert!(matches!(
            VariableCodeList::from_codes(codes),
            Err(NomenclatureError::DuplicateCode { .. })
        ));
    }

    #[test]
    fn test_missing_variables() {
        use crate::dataset::DataKey;

        let key = |variable: &str, unit: &str| DataKey::new("m", "s", "World", variable, unit, 2020);
        let df = Dataset::from_points([
            (key("Primary Energy", "EJ/yr"), 1.0),
            (key("Secondary Energy", "EJ/yr"), 1.0),
            (key("Secondary Energy", "Mtoe/yr"), 1.0),
            (key("Emissions|CH4", "Mt CH4/yr"), 1.0),
        ])
        .unwrap();
        let missing = codelist().missing_variables(&df);
        assert_eq!(
            missing.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Emissions|CH4", "Secondary Energy"]
        );

        let yaml = VariableCodeList::to_yaml(&missing).unwrap();
        assert!(yaml.contains("unit: Mt CH4/yr"));
        assert!(!yaml.contains("skip-region-aggregation"));
        let parsed = VariableCodeList::parse(&yaml, "new_variables.yaml").unwrap();
        assert_eq!(parsed[1].unit, vec!["EJ/yr", "Mtoe/yr"]);
    }

    #[test]
    fn test_regions() {
        let content = r#"
- common:
  - World
- R5:
  - R5ASIA
  - R5LAM: {iso3_codes: [BRA, MEX]}
"#;
        let regions =
            RegionCodeList::from_codes(RegionCodeList::parse(content, "regions.yaml").unwrap())
                .unwrap();
        assert_eq!(regions.len(), 3);
        assert!(regions.contains("R5LAM"));
        assert_eq!(regions.get("R5LAM").unwrap().hierarchy, "R5");
        assert!(regions.get("R5LAM").unwrap().attributes.contains_key("iso3_codes"));
        assert_eq!(
            regions.hierarchies().into_iter().collect::<Vec<_>>(),
            vec!["R5", "common"]
        );
        assert_eq!(
            regions.validate_items(["World", "Mars"]),
            vec!["Mars".to_string()]
        );
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "- common:\n  - World\n").unwrap();
        std::fs::write(dir.path().join("b.yaml"), "- common:\n  - World\n").unwrap();

        let err = RegionCodeList::from_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate code 'World'"));
    }
}
