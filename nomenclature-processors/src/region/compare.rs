//! Reconciliation of aggregated data with data reported at the common-region level.

use nomenclature_core::config::RegionProcessingConfig;
use nomenclature_core::dataset::{DataKey, Dataset, FloatValue};
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Tolerance for considering a reported and an aggregated value equal.
///
/// Values match if `|original - aggregated| <= atol` or
/// `|original - aggregated| / |original| <= rtol`. The relative check is not applied if
/// the original value is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 0.01,
            atol: 0.0,
        }
    }
}

impl Tolerance {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }

    pub fn relative(rtol: f64) -> Self {
        Self { rtol, atol: 0.0 }
    }

    pub fn is_within(&self, original: FloatValue, aggregated: FloatValue) -> bool {
        let diff = (original - aggregated).abs();
        if diff <= self.atol {
            return true;
        }
        original != 0.0 && diff / original.abs() <= self.rtol
    }
}

impl From<&RegionProcessingConfig> for Tolerance {
    fn from(config: &RegionProcessingConfig) -> Self {
        Self::new(config.rtol, config.atol)
    }
}

/// Percentage difference relative to the original value, infinite if the original is zero
pub fn difference_percent(original: FloatValue, aggregated: FloatValue) -> FloatValue {
    let diff = (original - aggregated).abs();
    if original == 0.0 {
        if diff == 0.0 {
            0.0
        } else {
            FloatValue::INFINITY
        }
    } else {
        diff * 100.0 / original.abs()
    }
}

/// A datapoint where the aggregated value differs from the reported one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceRow {
    pub model: String,
    pub scenario: String,
    pub region: String,
    pub variable: String,
    pub unit: String,
    pub year: i32,
    pub original: FloatValue,
    pub aggregated: FloatValue,
    pub difference_percent: FloatValue,
}

impl DifferenceRow {
    pub fn new(key: &DataKey, original: FloatValue, aggregated: FloatValue) -> Self {
        Self {
            model: key.model.clone(),
            scenario: key.scenario.clone(),
            region: key.region.clone(),
            variable: key.variable.clone(),
            unit: key.unit.clone(),
            year: key.year,
            original,
            aggregated,
            difference_percent: difference_percent(original, aggregated),
        }
    }

    pub fn key(&self) -> DataKey {
        DataKey::new(
            &self.model,
            &self.scenario,
            &self.region,
            &self.variable,
            &self.unit,
            self.year,
        )
    }
}

/// Datapoints where aggregation disagrees with reported data, largest difference first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifferenceReport {
    rows: Vec<DifferenceRow>,
}

impl DifferenceReport {
    pub fn new(mut rows: Vec<DifferenceRow>) -> Self {
        rows.sort_by(|a, b| {
            b.difference_percent
                .total_cmp(&a.difference_percent)
                .then_with(|| a.key().cmp(&b.key()))
        });
        Self { rows }
    }

    /// Combine reports, keeping the ordering
    pub fn merge<I: IntoIterator<Item = DifferenceReport>>(reports: I) -> Self {
        Self::new(reports.into_iter().flat_map(|r| r.rows).collect())
    }

    pub fn rows(&self) -> &[DifferenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv_to<W: Write>(&self, writer: W) -> NomenclatureResult<()> {
        let mut writer = csv::Writer::from_writer(writer);
        let to_error = |e: csv::Error| NomenclatureError::Error(e.to_string());
        if self.rows.is_empty() {
            // serialize only emits the header with the first row
            writer
                .write_record([
                    "model",
                    "scenario",
                    "region",
                    "variable",
                    "unit",
                    "year",
                    "original",
                    "aggregated",
                    "difference_percent",
                ])
                .map_err(to_error)?;
        }
        for row in &self.rows {
            writer.serialize(row).map_err(to_error)?;
        }
        writer
            .flush()
            .map_err(|e| NomenclatureError::Error(e.to_string()))
    }

    pub fn write_csv(&self, path: &Path) -> NomenclatureResult<()> {
        let file = std::fs::File::create(path).map_err(|source| NomenclatureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_csv_to(file)
    }
}

/// Merge aggregated data onto data reported at the common-region level.
///
/// Datapoints in only one of the inputs are kept. For datapoints in both, the original is
/// kept if the values match within `tolerance`; otherwise the aggregated value is used and
/// the pair is listed in the returned report.
pub fn compare(
    original: &Dataset,
    aggregated: &Dataset,
    tolerance: &Tolerance,
) -> NomenclatureResult<(Dataset, DifferenceReport)> {
    let mut merged = Dataset::new();
    let mut rows = Vec::new();

    for (key, value) in original.iter() {
        match aggregated.get(key) {
            Some(agg) if !tolerance.is_within(*value, agg) => {
                rows.push(DifferenceRow::new(key, *value, agg));
                merged.insert(key.clone(), agg)?;
            }
            _ => merged.insert(key.clone(), *value)?,
        }
    }
    for (key, value) in aggregated.iter() {
        if !original.contains_key(key) {
            merged.insert(key.clone(), *value)?;
        }
    }
    Ok((merged.with_meta_from(original), DifferenceReport::new(rows)))
}
