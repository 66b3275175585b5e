//! Processing steps applied to a dataset after validation.

use crate::dataset::Dataset;
use crate::definition::{DataStructureDefinition, Dimension};
use crate::errors::NomenclatureResult;
use tracing::info;

/// A step which validates and transforms a dataset.
pub trait Processor: std::fmt::Debug {
    /// Short name used when logging
    fn name(&self) -> &str;

    /// Check that the processor's configuration is consistent with the codelists
    fn validate_with_definition(&self, dsd: &DataStructureDefinition) -> NomenclatureResult<()>;

    /// Apply the processor, returning the processed data
    fn apply(&self, df: &Dataset) -> NomenclatureResult<Dataset>;

    /// True if this processor produces new regions, which must only be validated afterwards
    fn processes_regions(&self) -> bool {
        false
    }
}

/// Validate a dataset against a definition and run it through a list of processors.
///
/// If any processor aggregates or renames regions, the region dimension of the input is
/// not validated before processing. The output is always validated against all dimensions.
pub fn process(
    df: &Dataset,
    dsd: &DataStructureDefinition,
    processors: &[&dyn Processor],
) -> NomenclatureResult<Dataset> {
    for processor in processors {
        processor.validate_with_definition(dsd)?;
    }

    let all_dimensions = dsd.dimensions.clone();
    if processors.iter().any(|p| p.processes_regions()) {
        let dimensions: Vec<Dimension> = all_dimensions
            .iter()
            .copied()
            .filter(|d| *d != Dimension::Region)
            .collect();
        dsd.validate(df, &dimensions)?;
    } else {
        dsd.validate(df, &all_dimensions)?;
    }

    let mut processed = df.clone();
    for processor in processors {
        info!(processor = processor.name(), "Applying processor");
        processed = processor.apply(&processed)?;
    }

    dsd.validate(&processed, &all_dimensions)?;
    Ok(processed)
}
