//! Container for scenario data in the IAMC format.
//!
//! A [`Dataset`] maps a [`DataKey`] (model, scenario, region, variable, unit, year)
//! to a single numeric value. Keys are unique within a dataset; every operation that
//! could produce a duplicate key (insertion, concatenation, renaming) returns an error
//! instead of silently overwriting data.
//!
//! Scenario-level metadata (free-form string attributes per model/scenario pair) is
//! carried alongside the data and follows the data through filtering.
//!
//! # Example
//!
//! ```
//! use nomenclature_core::dataset::{DataKey, Dataset};
//!
//! let mut df = Dataset::new();
//! df.insert(DataKey::new("model_a", "scen_a", "World", "Primary Energy", "EJ/yr", 2020), 1.0)
//!     .unwrap();
//! df.insert(DataKey::new("model_a", "scen_a", "World", "Primary Energy", "EJ/yr", 2030), 2.0)
//!     .unwrap();
//!
//! assert_eq!(df.len(), 2);
//! assert!(df.regions().contains("World"));
//! ```

use crate::errors::{NomenclatureError, NomenclatureResult};
use crate::utils::{one_or_many, pattern_match};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type FloatValue = f64;
pub type Year = i32;

/// Index columns of the IAMC format, in canonical order.
pub const IAMC_INDEX: [&str; 5] = ["model", "scenario", "region", "variable", "unit"];

/// Coordinate of a single datapoint.
///
/// Ordering follows the IAMC column order so that iteration over a [`Dataset`]
/// is stable and grouped by timeseries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataKey {
    pub model: String,
    pub scenario: String,
    pub region: String,
    pub variable: String,
    pub unit: String,
    pub year: Year,
}

impl DataKey {
    pub fn new(
        model: impl Into<String>,
        scenario: impl Into<String>,
        region: impl Into<String>,
        variable: impl Into<String>,
        unit: impl Into<String>,
        year: Year,
    ) -> Self {
        Self {
            model: model.into(),
            scenario: scenario.into(),
            region: region.into(),
            variable: variable.into(),
            unit: unit.into(),
            year,
        }
    }

    /// Copy of this key with a different region
    pub fn with_region(&self, region: &str) -> Self {
        Self {
            region: region.to_string(),
            ..self.clone()
        }
    }

    /// Copy of this key with a different variable
    pub fn with_variable(&self, variable: &str) -> Self {
        Self {
            variable: variable.to_string(),
            ..self.clone()
        }
    }

    /// Get the value of one of the string dimensions by name
    pub fn dimension(&self, dimension: &str) -> Option<&str> {
        match dimension {
            "model" => Some(&self.model),
            "scenario" => Some(&self.scenario),
            "region" => Some(&self.region),
            "variable" => Some(&self.variable),
            "unit" => Some(&self.unit),
            _ => None,
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {})",
            self.model, self.scenario, self.region, self.variable, self.unit, self.year
        )
    }
}

/// Selection criteria along the IAMC dimensions.
///
/// Unset dimensions match everything. String criteria support `*` wildcards.
/// Deserializes from mappings like `{variable: Primary Energy, year: [2020, 2030]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataFilter {
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub model: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub region: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub variable: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub unit: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub year: Option<Vec<Year>>,
}

fn to_strings<I, S>(values: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Some(values.into_iter().map(|s| s.as_ref().to_string()).collect())
}

impl DataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.model = to_strings(values);
        self
    }

    pub fn scenario<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.scenario = to_strings(values);
        self
    }

    pub fn region<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.region = to_strings(values);
        self
    }

    pub fn variable<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.variable = to_strings(values);
        self
    }

    pub fn unit<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, values: I) -> Self {
        self.unit = to_strings(values);
        self
    }

    pub fn year<I: IntoIterator<Item = Year>>(mut self, values: I) -> Self {
        self.year = Some(values.into_iter().collect());
        self
    }

    /// Check whether a key satisfies every set criterion
    pub fn matches(&self, key: &DataKey) -> bool {
        fn check(criteria: &Option<Vec<String>>, value: &str) -> bool {
            criteria
                .as_ref()
                .map_or(true, |c| c.iter().any(|p| pattern_match(p, value)))
        }

        check(&self.model, &key.model)
            && check(&self.scenario, &key.scenario)
            && check(&self.region, &key.region)
            && check(&self.variable, &key.variable)
            && check(&self.unit, &key.unit)
            && self.year.as_ref().map_or(true, |y| y.contains(&key.year))
    }

    /// Criteria of the string dimensions which are set, as `(dimension, values)` pairs
    pub fn criteria(&self) -> Vec<(&'static str, &[String])> {
        [
            ("model", &self.model),
            ("scenario", &self.scenario),
            ("region", &self.region),
            ("variable", &self.variable),
            ("unit", &self.unit),
        ]
        .into_iter()
        .filter_map(|(name, values)| values.as_deref().map(|v| (name, v)))
        .collect()
    }
}

impl fmt::Display for DataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .criteria()
            .into_iter()
            .map(|(name, values)| format!("{name}: {}", values.join(", ")))
            .collect();
        if let Some(years) = &self.year {
            let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
            parts.push(format!("year: {}", years.join(", ")));
        }
        write!(f, "{{{}}}", parts.join("; "))
    }
}

/// Scenario data in the IAMC format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    data: BTreeMap<DataKey, FloatValue>,
    meta: BTreeMap<(String, String), BTreeMap<String, String>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from datapoints, failing on duplicate keys
    pub fn from_points<I>(points: I) -> NomenclatureResult<Self>
    where
        I: IntoIterator<Item = (DataKey, FloatValue)>,
    {
        let mut df = Self::new();
        for (key, value) in points {
            df.insert(key, value)?;
        }
        Ok(df)
    }

    /// Concatenate datasets, failing if any key is present in more than one of them
    pub fn concat<I>(datasets: I) -> NomenclatureResult<Self>
    where
        I: IntoIterator<Item = Dataset>,
    {
        let mut df = Self::new();
        for other in datasets {
            df.append(other)?;
        }
        Ok(df)
    }

    /// Add a single datapoint
    pub fn insert(&mut self, key: DataKey, value: FloatValue) -> NomenclatureResult<()> {
        if self.data.contains_key(&key) {
            return Err(NomenclatureError::DuplicateDataPoint {
                key: key.to_string(),
            });
        }
        self.data.insert(key, value);
        Ok(())
    }

    /// Move all datapoints and metadata of `other` into this dataset
    pub fn append(&mut self, other: Dataset) -> NomenclatureResult<()> {
        for (key, value) in other.data {
            self.insert(key, value)?;
        }
        for (index, attributes) in other.meta {
            self.meta.entry(index).or_default().extend(attributes);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &DataKey) -> Option<FloatValue> {
        self.data.get(key).copied()
    }

    pub fn contains_key(&self, key: &DataKey) -> bool {
        self.data.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataKey, &FloatValue)> {
        self.data.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DataKey> {
        self.data.keys()
    }

    fn distinct<'a, F>(&'a self, f: F) -> BTreeSet<&'a str>
    where
        F: Fn(&'a DataKey) -> &'a str,
    {
        self.data.keys().map(f).collect()
    }

    pub fn models(&self) -> BTreeSet<&str> {
        self.distinct(|k| &k.model)
    }

    pub fn scenarios(&self) -> BTreeSet<&str> {
        self.distinct(|k| &k.scenario)
    }

    pub fn regions(&self) -> BTreeSet<&str> {
        self.distinct(|k| &k.region)
    }

    pub fn variables(&self) -> BTreeSet<&str> {
        self.distinct(|k| &k.variable)
    }

    pub fn units(&self) -> BTreeSet<&str> {
        self.distinct(|k| &k.unit)
    }

    pub fn years(&self) -> BTreeSet<Year> {
        self.data.keys().map(|k| k.year).collect()
    }

    /// Distinct (model, scenario) pairs present in the data
    pub fn index(&self) -> BTreeSet<(&str, &str)> {
        self.data
            .keys()
            .map(|k| (k.model.as_str(), k.scenario.as_str()))
            .collect()
    }

    /// Units used for each variable
    pub fn units_by_variable(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut units: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for key in self.data.keys() {
            units.entry(&key.variable).or_default().insert(&key.unit);
        }
        units
    }

    /// Keep the datapoints for which `predicate` holds
    ///
    /// Metadata is restricted to the (model, scenario) pairs that remain.
    pub fn select<F>(&self, predicate: F) -> Dataset
    where
        F: Fn(&DataKey) -> bool,
    {
        let data: BTreeMap<DataKey, FloatValue> = self
            .data
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Dataset {
            data,
            meta: BTreeMap::new(),
        }
        .with_meta_from(self)
    }

    pub fn filter(&self, filter: &DataFilter) -> Dataset {
        self.select(|k| filter.matches(k))
    }

    pub fn filter_model(&self, model: &str) -> Dataset {
        self.select(|k| k.model == model)
    }

    pub fn filter_regions<S: AsRef<str>>(&self, regions: &[S]) -> Dataset {
        let regions: BTreeSet<&str> = regions.iter().map(|r| r.as_ref()).collect();
        self.select(|k| regions.contains(k.region.as_str()))
    }

    pub fn filter_variables<S: AsRef<str>>(&self, variables: &[S]) -> Dataset {
        let variables: BTreeSet<&str> = variables.iter().map(|v| v.as_ref()).collect();
        self.select(|k| variables.contains(k.variable.as_str()))
    }

    /// Rename regions according to `mapping`; regions not in `mapping` are unchanged
    ///
    /// Fails if the renaming makes two datapoints collide.
    pub fn rename_regions(&self, mapping: &BTreeMap<String, String>) -> NomenclatureResult<Dataset> {
        self.rename_with(|k| mapping.get(&k.region).map(|r| k.with_region(r)))
    }

    /// Rename variables according to `mapping`; variables not in `mapping` are unchanged
    pub fn rename_variables(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> NomenclatureResult<Dataset> {
        self.rename_with(|k| mapping.get(&k.variable).map(|v| k.with_variable(v)))
    }

    fn rename_with<F>(&self, rename: F) -> NomenclatureResult<Dataset>
    where
        F: Fn(&DataKey) -> Option<DataKey>,
    {
        let mut df = Dataset {
            data: BTreeMap::new(),
            meta: self.meta.clone(),
        };
        for (key, value) in &self.data {
            let key = rename(key).unwrap_or_else(|| key.clone());
            df.insert(key, *value)?;
        }
        Ok(df)
    }

    /// Set a scenario-level metadata attribute
    pub fn set_meta(
        &mut self,
        model: impl Into<String>,
        scenario: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.meta
            .entry((model.into(), scenario.into()))
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Metadata attributes of a model/scenario pair
    pub fn meta(&self, model: &str, scenario: &str) -> Option<&BTreeMap<String, String>> {
        self.meta.get(&(model.to_string(), scenario.to_string()))
    }

    pub fn meta_table(&self) -> &BTreeMap<(String, String), BTreeMap<String, String>> {
        &self.meta
    }

    /// Replace the metadata with that of `source`, restricted to the pairs present in `self`
    pub fn with_meta_from(mut self, source: &Dataset) -> Dataset {
        let index: BTreeSet<(String, String)> = self
            .index()
            .into_iter()
            .map(|(m, s)| (m.to_string(), s.to_string()))
            .collect();
        self.meta = source
            .meta
            .iter()
            .filter(|(k, _)| index.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self
    }
}

impl IntoIterator for Dataset {
    type Item = (DataKey, FloatValue);
    type IntoIter = std::collections::btree_map::IntoIter<DataKey, FloatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}
