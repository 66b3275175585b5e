use nomenclature_core::aggregation::AggregationArgs;
use nomenclature_core::codelist::{AggregationPolicy, VariableCodeList, WeightedAggregation};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A single aggregation of `variable`, stored in the processed data as `output`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationTask {
    pub variable: String,
    pub output: String,
    pub args: AggregationArgs,
}

/// Aggregation policy of the variables present in one model's data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableAggregationPolicy {
    default: BTreeSet<String>,
    weighted: BTreeMap<String, WeightedAggregation>,
    skip: BTreeSet<String>,
}

impl VariableAggregationPolicy {
    /// Split `variables` into default, weighted and skipped variables.
    ///
    /// Variables which are not in the codelist are not aggregated.
    pub fn partition<'a, I>(variables: I, codelist: &VariableCodeList) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut policy = Self::default();
        for variable in variables {
            let Some(code) = codelist.get(variable) else {
                debug!(variable, "Variable not in codelist, not aggregated");
                policy.skip.insert(variable.to_string());
                continue;
            };
            match code.policy() {
                AggregationPolicy::Default => {
                    policy.default.insert(variable.to_string());
                }
                AggregationPolicy::Weighted(weighted) => {
                    policy.weighted.insert(variable.to_string(), weighted);
                }
                AggregationPolicy::Skip => {
                    policy.skip.insert(variable.to_string());
                }
            }
        }
        policy
    }

    pub fn default_variables(&self) -> &BTreeSet<String> {
        &self.default
    }

    pub fn weighted_variables(&self) -> &BTreeMap<String, WeightedAggregation> {
        &self.weighted
    }

    pub fn skipped_variables(&self) -> &BTreeSet<String> {
        &self.skip
    }

    /// Variables which take part in region aggregation
    pub fn aggregated_variables(&self) -> Vec<&str> {
        self.default
            .iter()
            .chain(self.weighted.keys())
            .map(|v| v.as_str())
            .collect()
    }

    /// Aggregations to run for each common region
    ///
    /// Default variables come first. A weighted variable with rename targets yields one task
    /// per target, with the variable's arguments overlaid by the target's own.
    pub fn tasks(&self) -> Vec<AggregationTask> {
        let mut tasks: Vec<AggregationTask> = self
            .default
            .iter()
            .map(|variable| AggregationTask {
                variable: variable.clone(),
                output: variable.clone(),
                args: AggregationArgs::default(),
            })
            .collect();

        for (variable, weighted) in &self.weighted {
            if weighted.targets.is_empty() {
                tasks.push(AggregationTask {
                    variable: variable.clone(),
                    output: variable.clone(),
                    args: weighted.args.clone(),
                });
            }
            tasks.extend(weighted.targets.iter().map(|target| AggregationTask {
                variable: variable.clone(),
                output: target.name.clone(),
                args: weighted.args.merged_with(&target.args),
            }));
        }
        tasks
    }
}
