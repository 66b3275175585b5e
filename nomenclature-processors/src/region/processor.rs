use super::compare::{compare, DifferenceReport, Tolerance};
use super::mapping::RegionMapping;
use super::policy::VariableAggregationPolicy;
use super::repository::MappingRepository;
use nomenclature_core::aggregation::AggregationOutcome;
use nomenclature_core::dataset::Dataset;
use nomenclature_core::definition::{DataStructureDefinition, Dimension};
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use nomenclature_core::processor::Processor;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

/// Region processing of scenario data using per-model region mappings.
///
/// For every model with a mapping, native regions are selected and renamed and common
/// regions are aggregated from their constituents according to the aggregation settings of
/// the variable codelist. Data reported directly at the common-region level is reconciled
/// with the aggregated values, see [`compare`]. Models without a mapping pass unchanged.
#[derive(Debug, Clone)]
pub struct RegionProcessor {
    repository: MappingRepository,
    definition: DataStructureDefinition,
    tolerance: Tolerance,
}

impl RegionProcessor {
    pub fn new(
        repository: MappingRepository,
        definition: DataStructureDefinition,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            repository,
            definition,
            tolerance,
        }
    }

    /// Load all mappings in `path`, checking them against `definition`
    pub fn from_directory(
        path: &Path,
        definition: DataStructureDefinition,
        tolerance: Tolerance,
    ) -> NomenclatureResult<Self> {
        let dsd = definition.has(Dimension::Region).then_some(&definition);
        let repository = MappingRepository::from_directory(path, dsd)?;
        Ok(Self::new(repository, definition, tolerance))
    }

    pub fn repository(&self) -> &MappingRepository {
        &self.repository
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Apply region processing, also returning where aggregation and reported data disagree
    pub fn check_region_aggregation(
        &self,
        df: &Dataset,
    ) -> NomenclatureResult<(Dataset, DifferenceReport)> {
        let mut processed = Vec::new();
        let mut reports = Vec::new();

        for model in df.models() {
            let model_df = df.filter_model(model);
            match self.repository.lookup(model) {
                None => {
                    info!(model, "No model mapping found, data is passed through unchanged");
                    processed.push(model_df);
                }
                Some(mapping) => {
                    let (model_df, report) = self.apply_mapping(model, &model_df, mapping)?;
                    processed.push(model_df);
                    reports.push(report);
                }
            }
        }

        let result = Dataset::concat(processed)?.with_meta_from(df);
        if self.definition.has(Dimension::Region) {
            let invalid = self.definition.region.validate_items(result.regions());
            if !invalid.is_empty() {
                return Err(NomenclatureError::ProcessedRegionsNotDefined { regions: invalid });
            }
        }

        let report = DifferenceReport::merge(reports);
        if !report.is_empty() {
            warn!(
                count = report.len(),
                "Difference between original and aggregated data"
            );
        }
        Ok((result, report))
    }

    fn apply_mapping(
        &self,
        model: &str,
        model_df: &Dataset,
        mapping: &RegionMapping,
    ) -> NomenclatureResult<(Dataset, DifferenceReport)> {
        if self.definition.has(Dimension::Region) {
            mapping.validate_regions(&self.definition)?;
        }
        info!(model, file = mapping.file(), "Applying region-processing");

        let known = mapping.known_regions();
        let unexpected: Vec<String> = model_df
            .regions()
            .into_iter()
            .filter(|r| !known.contains(r))
            .map(|r| r.to_string())
            .collect();
        if !unexpected.is_empty() {
            return Err(NomenclatureError::UnexpectedRegions {
                model: model.to_string(),
                regions: unexpected,
                file: mapping.file().to_string(),
            });
        }

        let native_names: Vec<&str> = mapping.native_name_set().into_iter().collect();
        let native = model_df
            .filter_regions(&native_names)
            .rename_regions(&mapping.rename_table())?;

        let policy = VariableAggregationPolicy::partition(model_df.variables(), &self.definition.variable);
        let tasks = policy.tasks();
        let mut aggregated = Dataset::new();
        for common_region in mapping.common_regions() {
            // a single constituent is renamed, every variable is carried over
            if let [constituent] = common_region.constituent_regions.as_slice() {
                let rename = BTreeMap::from([(constituent.clone(), common_region.name.clone())]);
                aggregated.append(model_df.filter_regions(&[constituent]).rename_regions(&rename)?)?;
                continue;
            }
            for task in &tasks {
                let outcomes = model_df.aggregate_region(
                    &task.variable,
                    &common_region.name,
                    &common_region.constituent_regions,
                    &task.args,
                )?;
                for outcome in outcomes {
                    match outcome {
                        AggregationOutcome::Aggregated { key, value } => {
                            aggregated.insert(key.with_variable(&task.output), value)?;
                        }
                        AggregationOutcome::Skipped { key, reason } => {
                            info!(
                                model,
                                variable = %task.variable,
                                region = %common_region.name,
                                scenario = %key.scenario,
                                year = key.year,
                                %reason,
                                "Could not aggregate"
                            );
                        }
                    }
                }
            }
        }

        let common_names: Vec<&str> = mapping.common_region_names().into_iter().collect();
        let mut compared: BTreeSet<&str> = policy.aggregated_variables().into_iter().collect();
        compared.extend(aggregated.variables());
        let compared: Vec<&str> = compared.into_iter().collect();
        let reported = model_df
            .filter_regions(&common_names)
            .filter_variables(&compared);

        let (common, report) = match (aggregated.is_empty(), reported.is_empty()) {
            (false, false) => compare(&reported, &aggregated, &self.tolerance)?,
            (false, true) => (aggregated, DifferenceReport::default()),
            (true, false) => (reported, DifferenceReport::default()),
            (true, true) if native.is_empty() => {
                return Err(NomenclatureError::EmptyAggregationResult {
                    model: model.to_string(),
                    file: mapping.file().to_string(),
                })
            }
            (true, true) => (Dataset::new(), DifferenceReport::default()),
        };

        let result = Dataset::concat([native, common])?.with_meta_from(model_df);
        Ok((result, report))
    }

    /// Undo region processing: drop common regions and restore native region names
    pub fn revert(&self, df: &Dataset) -> NomenclatureResult<Dataset> {
        let mut reverted = Vec::new();
        for model in df.models() {
            let model_df = df.filter_model(model);
            match self.repository.lookup(model) {
                None => reverted.push(model_df),
                Some(mapping) => {
                    let common: BTreeSet<&str> = mapping.common_region_names();
                    reverted.push(
                        model_df
                            .select(|k| !common.contains(k.region.as_str()))
                            .rename_regions(&mapping.reverse_rename_table())?,
                    );
                }
            }
        }
        Ok(Dataset::concat(reverted)?.with_meta_from(df))
    }
}

impl Processor for RegionProcessor {
    fn name(&self) -> &str {
        "region-processing"
    }

    fn validate_with_definition(&self, dsd: &DataStructureDefinition) -> NomenclatureResult<()> {
        if dsd.has(Dimension::Region) {
            self.repository.validate_regions(dsd)?;
        }
        Ok(())
    }

    fn apply(&self, df: &Dataset) -> NomenclatureResult<Dataset> {
        self.check_region_aggregation(df).map(|(df, _)| df)
    }

    fn processes_regions(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomenclature_core::codelist::{RegionCodeList, VariableCodeList};
    use nomenclature_core::dataset::DataKey;

    fn processor(mapping: &str, regions: &[&str]) -> RegionProcessor {
        let variables = VariableCodeList::from_codes(
            VariableCodeList::parse(
                "- Primary Energy:\n    unit: EJ/yr\n- Share:\n    unit: '%'\n    skip-region-aggregation: true\n",
                "variables.yaml",
            )
            .unwrap(),
        )
        .unwrap();
        let dsd = DataStructureDefinition::new(
            RegionCodeList::from_names("common", regions).unwrap(),
            variables,
        );
        let repository = MappingRepository::from_mappings(
            [RegionMapping::from_yaml_str(mapping, "mapping.yaml").unwrap()],
            Some(&dsd),
        )
        .unwrap();
        RegionProcessor::new(repository, dsd, Tolerance::default())
    }

    fn key(model: &str, region: &str, variable: &str) -> DataKey {
        DataKey::new(model, "scen", region, variable, "EJ/yr", 2020)
    }

    #[test]
    fn test_unmapped_model_passes_through() {
        let processor = processor("model: m\nnative_regions: [World]\n", &["World", "Other"]);
        let df = Dataset::from_points([(key("other_model", "Other", "Primary Energy"), 1.0)]).unwrap();
        let (processed, report) = processor.check_region_aggregation(&df).unwrap();
        assert_eq!(processed, df);
        assert!(report.is_empty());
    }

    #[test]
    fn test_unexpected_region() {
        let processor = processor("model: m\nnative_regions: [World]\n", &["World"]);
        let df = Dataset::from_points([
            (key("m", "World", "Primary Energy"), 1.0),
            (key("m", "Mars", "Primary Energy"), 1.0),
        ])
        .unwrap();
        match processor.apply(&df) {
            Err(NomenclatureError::UnexpectedRegions { model, regions, file }) => {
                assert_eq!(model, "m");
                assert_eq!(regions, vec!["Mars"]);
                assert_eq!(file, "mapping.yaml");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_excluded_region_is_dropped() {
        let processor = processor(
            "model: m\nnative_regions: [World]\nexclude_regions: [Mars]\n",
            &["World"],
        );
        let df = Dataset::from_points([
            (key("m", "World", "Primary Energy"), 1.0),
            (key("m", "Mars", "Primary Energy"), 1.0),
        ])
        .unwrap();
        let processed = processor.apply(&df).unwrap();
        assert_eq!(processed.regions().into_iter().collect::<Vec<_>>(), vec!["World"]);
    }

    #[test]
    fn test_skipped_variables_are_not_aggregated() {
        let processor = processor(
            "model: m\ncommon_regions:\n  - World: [a, b]\nexclude_regions: [a, b]\n",
            &["World"],
        );
        let df = Dataset::from_points([
            (key("m", "a", "Primary Energy"), 1.0),
            (key("m", "b", "Primary Energy"), 2.0),
            (key("m", "a", "Share"), 10.0),
            (key("m", "b", "Share"), 20.0),
            (key("m", "World", "Share"), 15.0),
        ])
        .unwrap();
        let processed = processor.apply(&df).unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed.get(&key("m", "World", "Primary Energy")), Some(3.0));
    }

    #[test]
    fn test_single_constituent_is_renamed() {
        let processor = processor(
            "model: m\ncommon_regions:\n  - Asia: [c]\n  - World: [a, c]\nexclude_regions: [a, c]\n",
            &["World", "Asia"],
        );
        let df = Dataset::from_points([
            (key("m", "a", "Primary Energy"), 2.0),
            (key("m", "c", "Primary Energy"), 1.0),
            (key("m", "c", "Share"), 30.0),
            (key("m", "c", "Price|Carbon"), 50.0),
            (key("m", "Asia", "Primary Energy"), 1.5),
        ])
        .unwrap();
        let (processed, report) = processor.check_region_aggregation(&df).unwrap();

        // skipped and unknown variables are carried over as well
        assert_eq!(processed.get(&key("m", "Asia", "Share")), Some(30.0));
        assert_eq!(processed.get(&key("m", "Asia", "Price|Carbon")), Some(50.0));
        assert_eq!(processed.get(&key("m", "World", "Primary Energy")), Some(3.0));
        assert_eq!(processed.get(&key("m", "World", "Share")), None);

        // the renamed data is reconciled with the reported data
        assert_eq!(processed.get(&key("m", "Asia", "Primary Energy")), Some(1.0));
        assert_eq!(report.len(), 1);
        assert_eq!(report.rows()[0].region, "Asia");
    }

    #[test]
    fn test_empty_result() {
        let processor = processor(
            "model: m\ncommon_regions:\n  - World: [a, b]\nexclude_regions: [a, b]\n",
            &["World"],
        );
        let df = Dataset::from_points([(key("m", "a", "Share"), 1.0)]).unwrap();
        assert!(matches!(
            processor.apply(&df),
            Err(NomenclatureError::EmptyAggregationResult { .. })
        ));
    }

    #[test]
    fn test_processed_regions_must_be_defined() {
        // the mapping is valid for the codelist it was loaded with
        let processor = processor("model: m\nnative_regions: [World]\n", &["World"]);
        let df = Dataset::from_points([(key("other_model", "Mars", "Primary Energy"), 1.0)]).unwrap();
        assert!(matches!(
            processor.apply(&df),
            Err(NomenclatureError::ProcessedRegionsNotDefined { .. })
        ));
    }

    #[test]
    fn test_meta_is_carried_through() {
        let processor = processor("model: m\nnative_regions:\n  - a: World\n", &["World"]);
        let mut df = Dataset::from_points([(key("m", "a", "Primary Energy"), 1.0)]).unwrap();
        df.set_meta("m", "scen", "version", "2");
        let processed = processor.apply(&df).unwrap();
        assert_eq!(
            processed.meta("m", "scen").unwrap().get("version").map(|v| v.as_str()),
            Some("2")
        );
    }
}
