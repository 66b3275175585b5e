use std::path::PathBuf;
use thiserror::Error;

/// Error type for invalid definitions, mappings and data.
#[derive(Error, Debug)]
pub enum NomenclatureError {
    #[error("{0}")]
    Error(String),
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {file}: {details}")]
    Parse { file: String, details: String },
    #[error("Duplicate data point for {key}")]
    DuplicateDataPoint { key: String },
    #[error("Duplicate code '{code}' in codelist '{codelist}'")]
    DuplicateCode { codelist: String, code: String },
    #[error("Name collision in {location} for {duplicates:?} in {file}")]
    RegionNameCollision {
        location: String,
        duplicates: Vec<String>,
        file: String,
    },
    #[error("Common region '{region}' lists itself as a constituent region in {file}")]
    SelfReferencingCommonRegion { region: String, file: String },
    #[error(
        "Constituent region(s) {regions:?} of common region '{common_region}' are neither \
         in 'native_regions' nor in 'exclude_regions' in {file}"
    )]
    MissingConstituentRegions {
        common_region: String,
        regions: Vec<String>,
        file: String,
    },
    #[error("At least one of the two: 'native_regions', 'common_regions' must be given in {file}")]
    NoRegionsDefined { file: String },
    #[error("Region(s) {regions:?} can only be present in 'exclude_regions' or '{region_type}' in {file}")]
    ExcludeRegionOverlap {
        regions: Vec<String>,
        region_type: String,
        file: String,
    },
    #[error("Multiple region aggregation mappings for model {model} in [{file1}, {file2}]")]
    ModelMappingCollision {
        model: String,
        file1: String,
        file2: String,
    },
    #[error("Region(s) {regions:?} in {file} not defined in the DataStructureDefinition")]
    RegionNotDefined { regions: Vec<String>, file: String },
    #[error(
        "Did not find region(s) {regions:?} in 'native_regions', 'common_regions' or \
         'exclude_regions' in model mapping for {model} in {file}. If they are not meant to be \
         included in the results add to the 'exclude_regions' section in the model mapping to \
         silence this error."
    )]
    UnexpectedRegions {
        model: String,
        regions: Vec<String>,
        file: String,
    },
    #[error("The region-processing for model {model} ({file}) returned an empty dataset")]
    EmptyAggregationResult { model: String, file: String },
    #[error("Region(s) {regions:?} resulting from region-processing are not defined in the region codelist")]
    ProcessedRegionsNotDefined { regions: Vec<String> },
    #[error("The following {dimension}(s) are not defined in the DataStructureDefinition: {invalid:?}")]
    NotDefined {
        dimension: String,
        invalid: Vec<String>,
    },
    #[error("Variable '{variable}' reported in unit(s) {found:?}, expected one of {expected:?}")]
    InvalidUnit {
        variable: String,
        found: Vec<String>,
        expected: Vec<String>,
    },
    #[error("Variable(s) {missing:?} used as 'weight' for {variable} are not defined in the variable codelist")]
    MissingWeight {
        variable: String,
        missing: Vec<String>,
    },
    #[error("Region-aggregation target(s) {targets:?} of variable '{variable}' are not defined in the variable codelist")]
    UndefinedRenameTarget {
        variable: String,
        targets: Vec<String>,
    },
    #[error("Invalid aggregation arguments for variable '{variable}': {reason}")]
    InvalidAggregationArgs { variable: String, reason: String },
    #[error("Data validation failed for {count} datapoint(s) in {file}")]
    DataValidationFailed { count: usize, file: String },
    #[error("Required data missing for model(s) {models:?} ({file})")]
    RequiredDataMissing { models: Vec<String>, file: String },
    #[error("{} error(s) {description}:\n{}", .errors.len(), display_errors(.errors))]
    Collected {
        description: String,
        errors: Vec<NomenclatureError>,
    },
}

fn display_errors(errors: &[NomenclatureError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("  {}. {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n")
}

impl NomenclatureError {
    /// Turn a list of errors into a single result, `Ok(())` if the list is empty.
    ///
    /// A single error is returned as-is rather than wrapped.
    pub fn collect(
        description: impl Into<String>,
        mut errors: Vec<NomenclatureError>,
    ) -> NomenclatureResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NomenclatureError::Collected {
                description: description.into(),
                errors,
            }),
        }
    }

    /// Flattened view over the errors contained in this error.
    pub fn errors(&self) -> Vec<&NomenclatureError> {
        match self {
            NomenclatureError::Collected { errors, .. } => {
                errors.iter().flat_map(|e| e.errors()).collect()
            }
            other => vec![other],
        }
    }
}

/// Convenience type for `Result<T, NomenclatureError>`.
pub type NomenclatureResult<T> = Result<T, NomenclatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_empty_is_ok() {
        assert!(NomenclatureError::collect("in test", vec![]).is_ok());
    }

    #[test]
    fn collect_single_is_unwrapped() {
        let err = NomenclatureError::collect(
            "in test",
            vec![NomenclatureError::Error("boom".to_string())],
        )
        .unwrap_err();
        assert!(matches!(err, NomenclatureError::Error(_)));
    }

    #[test]
    fn collected_message_lists_every_error() {
        let err = NomenclatureError::collect(
            "when loading mappings",
            vec![
                NomenclatureError::NoRegionsDefined {
                    file: "a.yaml".to_string(),
                },
                NomenclatureError::ModelMappingCollision {
                    model: "M".to_string(),
                    file1: "b.yaml".to_string(),
                    file2: "c.yaml".to_string(),
                },
            ],
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("2 error(s) when loading mappings"));
        assert!(message.contains("a.yaml"));
        assert!(message.contains("[b.yaml, c.yaml]"));
        assert_eq!(err.errors().len(), 2);
    }
}
