//! Reading and writing IAMC-format CSV files.
//!
//! Two layouts are accepted when reading:
//!
//! - wide: `Model, Scenario, Region, Variable, Unit, 2020, 2030, ...`
//! - long: `Model, Scenario, Region, Variable, Unit, Year, Value`
//!
//! Column names are matched case-insensitively and empty value cells are skipped.
//! Datasets are always written in the wide layout.

use crate::dataset::{DataKey, Dataset, FloatValue, Year, IAMC_INDEX};
use crate::errors::{NomenclatureError, NomenclatureResult};
use crate::utils::relative_path;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

enum Layout {
    Wide(Vec<(usize, Year)>),
    Long { year: usize, value: usize },
}

fn parse_error(source: &str, details: impl ToString) -> NomenclatureError {
    NomenclatureError::Parse {
        file: source.to_string(),
        details: details.to_string(),
    }
}

/// Read a dataset from an IAMC-format CSV file
pub fn read_csv(path: &Path) -> NomenclatureResult<Dataset> {
    let file = std::fs::File::open(path).map_err(|source| NomenclatureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv_from(file, &relative_path(path))
}

/// Read a dataset in IAMC format from any reader; `source` is used in error messages
pub fn read_csv_from<R: Read>(reader: R, source: &str) -> NomenclatureResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| parse_error(source, e))?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let mut index = [0usize; 5];
    for (i, column) in IAMC_INDEX.iter().enumerate() {
        index[i] = position(column)
            .ok_or_else(|| parse_error(source, format!("missing required column '{column}'")))?;
    }

    let layout = match (position("year"), position("value")) {
        (Some(year), Some(value)) => Layout::Long { year, value },
        _ => {
            let mut years = Vec::new();
            for (i, header) in headers.iter().enumerate() {
                if index.contains(&i) {
                    continue;
                }
                let year = header
                    .parse::<Year>()
                    .map_err(|_| parse_error(source, format!("unexpected column '{header}'")))?;
                years.push((i, year));
            }
            Layout::Wide(years)
        }
    };

    let mut df = Dataset::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| parse_error(source, e))?;
        let field = |i: usize| record.get(i).unwrap_or_default();
        let parse_value = |raw: &str| {
            raw.parse::<FloatValue>().map_err(|_| {
                parse_error(source, format!("invalid value '{raw}' in row {}", row + 1))
            })
        };
        let make_key = |year: Year| {
            DataKey::new(
                field(index[0]),
                field(index[1]),
                field(index[2]),
                field(index[3]),
                field(index[4]),
                year,
            )
        };

        match &layout {
            Layout::Long { year, value } => {
                let raw = field(*value);
                if raw.is_empty() {
                    continue;
                }
                let year = field(*year).parse::<Year>().map_err(|_| {
                    parse_error(source, format!("invalid year '{}' in row {}", field(*year), row + 1))
                })?;
                df.insert(make_key(year), parse_value(raw)?)?;
            }
            Layout::Wide(years) => {
                for (i, year) in years {
                    let raw = field(*i);
                    if raw.is_empty() {
                        continue;
                    }
                    df.insert(make_key(*year), parse_value(raw)?)?;
                }
            }
        }
    }
    Ok(df)
}

/// Write a dataset to a CSV file in the wide IAMC layout
pub fn write_csv(df: &Dataset, path: &Path) -> NomenclatureResult<()> {
    let file = std::fs::File::create(path).map_err(|source| NomenclatureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv_to(df, file, &relative_path(path))
}

/// Write a dataset in the wide IAMC layout to any writer
pub fn write_csv_to<W: Write>(df: &Dataset, writer: W, target: &str) -> NomenclatureResult<()> {
    let years: Vec<Year> = df.years().into_iter().collect();

    let mut timeseries: BTreeMap<[&str; 5], BTreeMap<Year, FloatValue>> = BTreeMap::new();
    for (key, value) in df.iter() {
        timeseries
            .entry([
                key.model.as_str(),
                key.scenario.as_str(),
                key.region.as_str(),
                key.variable.as_str(),
                key.unit.as_str(),
            ])
            .or_default()
            .insert(key.year, *value);
    }

    let mut writer = csv::Writer::from_writer(writer);
    let mut header: Vec<String> = ["Model", "Scenario", "Region", "Variable", "Unit"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(years.iter().map(|y| y.to_string()));
    writer
        .write_record(&header)
        .map_err(|e| parse_error(target, e))?;

    for (index, values) in timeseries {
        let mut record: Vec<String> = index.iter().map(|s| s.to_string()).collect();
        record.extend(
            years
                .iter()
                .map(|y| values.get(y).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer
            .write_record(&record)
            .map_err(|e| parse_error(target, e))?;
    }
    writer.flush().map_err(|source| NomenclatureError::Io {
        path: target.into(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDE: &str = "\
Model,Scenario,Region,Variable,Unit,2020,2030
model_a,scen_a,World,Primary Energy,EJ/yr,1.0,6.0
model_a,scen_a,World,Primary Energy|Coal,EJ/yr,0.5,
";

    #[test]
    fn test_read_wide() {
        let df = read_csv_from(WIDE.as_bytes(), "test.csv").unwrap();
        assert_eq!(df.len(), 3);
        assert_eq!(
            df.get(&DataKey::new("model_a", "scen_a", "World", "Primary Energy", "EJ/yr", 2030)),
            Some(6.0)
        );
    }

    #[test]
    fn test_read_long_case_insensitive() {
        let long = "\
model,scenario,region,variable,unit,year,value
model_a,scen_a,World,Primary Energy,EJ/yr,2020,1.0
model_a,scen_a,World,Primary Energy,EJ/yr,2030,
";
        let df = read_csv_from(long.as_bytes(), "test.csv").unwrap();
        assert_eq!(df.len(), 1);
        assert_eq!(df.years().into_iter().collect::<Vec<_>>(), vec![2020]);
    }

    #[test]
    fn test_read_errors() {
        let missing = "Model,Scenario,Region,Variable,2020\nm,s,r,v,1\n";
        let err = read_csv_from(missing.as_bytes(), "bad.csv").unwrap_err();
        assert!(err.to_string().contains("missing required column 'unit'"));

        let bad_value = "Model,Scenario,Region,Variable,Unit,2020\nm,s,r,v,u,abc\n";
        let err = read_csv_from(bad_value.as_bytes(), "bad.csv").unwrap_err();
        assert!(err.to_string().contains("invalid value 'abc'"));
    }

    #[test]
    fn test_write_wide() {
        let df = read_csv_from(WIDE.as_bytes(), "test.csv").unwrap();
        let mut buffer = Vec::new();
        write_csv_to(&df, &mut buffer, "memory").unwrap();
        let written = String::from_utf8(buffer).unwrap();

        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "Model,Scenario,Region,Variable,Unit,2020,2030");
        assert_eq!(lines[2], "model_a,scen_a,World,Primary Energy|Coal,EJ/yr,0.5,");
        assert_eq!(read_csv_from(written.as_bytes(), "memory").unwrap(), df);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let df = read_csv_from(WIDE.as_bytes(), "test.csv").unwrap();
        write_csv(&df, &path).unwrap();
        assert_eq!(read_csv(&path).unwrap(), df);
    }
}
