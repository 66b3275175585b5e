//! Numeric roll-up of a variable from subregions to a region.
//!
//! [`Dataset::aggregate_region`] groups the datapoints of one variable by
//! (model, scenario, unit, year) and reduces the values reported for the subregions
//! into a single value for the target region.
//!
//! # Aggregation methods
//!
//! - [`AggregationMethod::Sum`] (default)
//! - [`AggregationMethod::Mean`], [`AggregationMethod::Min`], [`AggregationMethod::Max`],
//!   [`AggregationMethod::Median`]
//! - [`AggregationMethod::WeightedAverage`]: $\sum_i v_i w_i / \sum_i w_i$ using the values
//!   of the `weight` variable for the same subregions
//!
//! A group which cannot be aggregated (for example because the weight is not reported
//! for the same subregions as the variable) yields [`AggregationOutcome::Skipped`]
//! instead of an error, so that the caller can decide how to report it.

use crate::dataset::{DataKey, Dataset, FloatValue, Year};
use crate::errors::{NomenclatureError, NomenclatureResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Reduction applied to the subregion values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationMethod {
    #[default]
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "mean", alias = "avg")]
    Mean,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "median")]
    Median,
    /// Requires a `weight` variable
    #[serde(rename = "w.avg")]
    WeightedAverage,
}

impl AggregationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationMethod::Sum => "sum",
            AggregationMethod::Mean => "mean",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Median => "median",
            AggregationMethod::WeightedAverage => "w.avg",
        }
    }

    /// Reduce a non-empty list of values.
    ///
    /// Without weights a weighted average reduces to the mean.
    fn reduce(&self, values: &[FloatValue]) -> FloatValue {
        match self {
            AggregationMethod::Sum => values.iter().sum(),
            AggregationMethod::Mean | AggregationMethod::WeightedAverage => {
                values.iter().sum::<FloatValue>() / values.len() as FloatValue
            }
            AggregationMethod::Min => values.iter().copied().fold(FloatValue::INFINITY, f64::min),
            AggregationMethod::Max => values
                .iter()
                .copied()
                .fold(FloatValue::NEG_INFINITY, f64::max),
            AggregationMethod::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        }
    }
}

/// Arguments controlling how a variable is aggregated to a region.
///
/// All fields are optional so that arguments can be layered, see [`AggregationArgs::merged_with`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AggregationArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AggregationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_negative_weights: Option<bool>,
}

impl AggregationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(mut self, weight: &str) -> Self {
        self.weight = Some(weight.to_string());
        self
    }

    pub fn with_method(mut self, method: AggregationMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_components<S: AsRef<str>>(mut self, components: &[S]) -> Self {
        self.components = Some(components.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    pub fn with_drop_negative_weights(mut self, drop: bool) -> Self {
        self.drop_negative_weights = Some(drop);
        self
    }

    /// True if no argument is set, i.e. a plain sum
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Arguments of `self` overlaid by every argument set in `overrides`
    pub fn merged_with(&self, overrides: &AggregationArgs) -> AggregationArgs {
        AggregationArgs {
            weight: overrides.weight.clone().or_else(|| self.weight.clone()),
            method: overrides.method.or(self.method),
            components: overrides
                .components
                .clone()
                .or_else(|| self.components.clone()),
            drop_negative_weights: overrides.drop_negative_weights.or(self.drop_negative_weights),
        }
    }

    /// The method used: explicit, otherwise weighted average if a weight is given, else sum
    pub fn effective_method(&self) -> AggregationMethod {
        match (self.method, &self.weight) {
            (Some(method), _) => method,
            (None, Some(_)) => AggregationMethod::WeightedAverage,
            (None, None) => AggregationMethod::Sum,
        }
    }

    /// Check that the combination of arguments is meaningful for `variable`
    pub fn validate(&self, variable: &str) -> NomenclatureResult<()> {
        let invalid = |reason: String| {
            Err(NomenclatureError::InvalidAggregationArgs {
                variable: variable.to_string(),
                reason,
            })
        };
        let method = self.effective_method();

        if self.weight.is_some() && method != AggregationMethod::WeightedAverage {
            return invalid(format!(
                "'weight' can only be used with method 'w.avg', found '{}'",
                method.name()
            ));
        }
        if self.weight.is_none() && method == AggregationMethod::WeightedAverage {
            return invalid("method 'w.avg' requires a 'weight'".to_string());
        }
        if self.components.is_some() && method != AggregationMethod::Sum {
            return invalid(format!(
                "'components' can only be used with method 'sum', found '{}'",
                method.name()
            ));
        }
        Ok(())
    }
}

/// Result of aggregating one (model, scenario, unit, year) group.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    Aggregated { key: DataKey, value: FloatValue },
    Skipped { key: DataKey, reason: String },
}

impl AggregationOutcome {
    pub fn key(&self) -> &DataKey {
        match self {
            AggregationOutcome::Aggregated { key, .. } => key,
            AggregationOutcome::Skipped { key, .. } => key,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, AggregationOutcome::Skipped { .. })
    }
}

impl Dataset {
    /// Aggregate `variable` from `subregions` to `region`.
    ///
    /// Returns one outcome per (model, scenario, unit, year) for which the variable is
    /// reported in at least one subregion. Invalid argument combinations are an error.
    pub fn aggregate_region<S: AsRef<str>>(
        &self,
        variable: &str,
        region: &str,
        subregions: &[S],
        args: &AggregationArgs,
    ) -> NomenclatureResult<Vec<AggregationOutcome>> {
        args.validate(variable)?;
        let subregions: BTreeSet<&str> = subregions.iter().map(|r| r.as_ref()).collect();

        let mut groups: BTreeMap<DataKey, Vec<(&str, FloatValue)>> = BTreeMap::new();
        for (key, value) in self.iter() {
            if key.variable == variable && subregions.contains(key.region.as_str()) {
                groups
                    .entry(key.with_region(region))
                    .or_default()
                    .push((key.region.as_str(), *value));
            }
        }

        let method = args.effective_method();
        if method == AggregationMethod::WeightedAverage {
            // validated above
            let weight = args.weight.as_deref().unwrap_or_default();
            let drop_negative = args.drop_negative_weights.unwrap_or(true);
            return Ok(self.weighted_average(groups, weight, &subregions, drop_negative));
        }

        let mut aggregated: BTreeMap<DataKey, FloatValue> = groups
            .into_iter()
            .map(|(key, values)| {
                let values: Vec<FloatValue> = values.into_iter().map(|(_, v)| v).collect();
                (key, method.reduce(&values))
            })
            .collect();

        if let Some(components) = &args.components {
            for (key, value) in self.iter() {
                if key.region == region && components.contains(&key.variable) {
                    *aggregated.entry(key.with_variable(variable)).or_insert(0.0) += value;
                }
            }
        }

        Ok(aggregated
            .into_iter()
            .map(|(key, value)| AggregationOutcome::Aggregated { key, value })
            .collect())
    }

    fn weighted_average(
        &self,
        groups: BTreeMap<DataKey, Vec<(&str, FloatValue)>>,
        weight: &str,
        subregions: &BTreeSet<&str>,
        drop_negative: bool,
    ) -> Vec<AggregationOutcome> {
        // weights are matched on (model, scenario, year, region), independent of their unit
        let mut weights: BTreeMap<(&str, &str, Year), BTreeMap<&str, FloatValue>> = BTreeMap::new();
        for (key, value) in self.iter() {
            if key.variable == weight && subregions.contains(key.region.as_str()) {
                weights
                    .entry((key.model.as_str(), key.scenario.as_str(), key.year))
                    .or_default()
                    .insert(key.region.as_str(), *value);
            }
        }

        let mut outcomes = Vec::with_capacity(groups.len());
        for (key, values) in groups {
            let group_weights = weights.get(&(key.model.as_str(), key.scenario.as_str(), key.year));
            let consistent = group_weights.is_some_and(|w| {
                w.len() == values.len() && values.iter().all(|(r, _)| w.contains_key(r))
            });
            let group_weights = match group_weights {
                Some(w) if consistent => w,
                _ => {
                    outcomes.push(AggregationOutcome::Skipped {
                        key,
                        reason: "Inconsistent index between variable and weight".to_string(),
                    });
                    continue;
                }
            };

            let mut pairs: Vec<(FloatValue, FloatValue)> = Vec::with_capacity(values.len());
            for (subregion, value) in values {
                let w = group_weights[subregion];
                if drop_negative && w < 0.0 {
                    warn!(
                        weight,
                        region = subregion,
                        year = key.year,
                        value = w,
                        "Dropping negative weight"
                    );
                    continue;
                }
                pairs.push((value, w));
            }

            let total_weight: FloatValue = pairs.iter().map(|(_, w)| w).sum();
            if total_weight == 0.0 {
                outcomes.push(AggregationOutcome::Skipped {
                    key,
                    reason: "Sum of weights is zero".to_string(),
                });
                continue;
            }
            let value = pairs.iter().map(|(v, w)| v * w).sum::<FloatValue>() / total_weight;
            outcomes.push(AggregationOutcome::Aggregated { key, value });
        }
        outcomes
    }
}
