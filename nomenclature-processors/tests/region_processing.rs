//! End-to-end region processing with definitions and mappings loaded from disk.

use is_close::is_close;
use nomenclature_core::dataset::{DataKey, Dataset};
use nomenclature_core::definition::{DataStructureDefinition, Dimension};
use nomenclature_core::errors::NomenclatureError;
use nomenclature_core::processor::{process, Processor};
use nomenclature_processors::region::{MappingRepository, RegionProcessor, Tolerance};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const REGIONS: &str = r#"
- common:
    - World
    - Asia
- model native:
    - m|A
    - m|B
    - a
    - b
    - c
"#;

const VARIABLES: &str = r#"
- Primary Energy:
    unit: EJ/yr
- Final Energy:
    unit: EJ/yr
- Population:
    unit: million
- Price|Carbon:
    unit: USD_2010/t CO2
    weight: Population
- Temperature:
    unit: K
    region-aggregation:
      - Temperature|Max:
          method: max
      - Temperature|Mean:
          method: mean
- Temperature|Max:
    unit: K
- Temperature|Mean:
    unit: K
"#;

/// A project folder with definitions and the given mapping files
fn project(mappings: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let write = |path: &Path, content: &str| {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    };
    write(&dir.path().join("definitions/region/regions.yaml"), REGIONS);
    write(&dir.path().join("definitions/variable/variables.yaml"), VARIABLES);
    fs::create_dir_all(dir.path().join("mappings")).unwrap();
    for (name, content) in mappings {
        write(&dir.path().join("mappings").join(name), content);
    }
    dir
}

fn definition(dir: &TempDir) -> DataStructureDefinition {
    DataStructureDefinition::from_directory(
        &dir.path().join("definitions"),
        &[Dimension::Region, Dimension::Variable],
    )
    .unwrap()
}

fn processor(dir: &TempDir, tolerance: Tolerance) -> RegionProcessor {
    RegionProcessor::from_directory(&dir.path().join("mappings"), definition(dir), tolerance)
        .unwrap()
}

fn key(region: &str, variable: &str) -> DataKey {
    let unit = match variable {
        "Population" => "million",
        "Price|Carbon" => "USD_2010/t CO2",
        v if v.starts_with("Temperature") => "K",
        _ => "EJ/yr",
    };
    DataKey::new("m", "scen", region, variable, unit, 2020)
}

fn data(points: &[(&str, &str, f64)]) -> Dataset {
    Dataset::from_points(points.iter().map(|(r, v, x)| (key(r, v), *x))).unwrap()
}

const WORLD_FROM_A_B: &str = r#"
model: m
native_regions: [a, b]
common_regions:
  - World: [a, b]
"#;

#[test]
fn test_tolerance_boundary() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let processor = processor(&dir, Tolerance::relative(0.01));

    // 101 is within 1% of 100, the reported value is kept
    let df = data(&[
        ("a", "Primary Energy", 50.0),
        ("b", "Primary Energy", 51.0),
        ("World", "Primary Energy", 100.0),
    ]);
    let (processed, report) = processor.check_region_aggregation(&df).unwrap();
    assert!(report.is_empty());
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(100.0));

    // 102 is not, the aggregated value replaces it
    let df = data(&[
        ("a", "Primary Energy", 50.0),
        ("b", "Primary Energy", 52.0),
        ("World", "Primary Energy", 100.0),
    ]);
    let (processed, report) = processor.check_region_aggregation(&df).unwrap();
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(102.0));
    assert_eq!(report.len(), 1);
    assert!(is_close!(report.rows()[0].difference_percent, 2.0));
}

#[test]
fn test_reported_value_within_tolerance_is_kept() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let df = data(&[
        ("a", "Primary Energy", 1.0),
        ("b", "Primary Energy", 2.0),
        ("World", "Primary Energy", 3.1),
    ]);

    let (processed, report) = processor(&dir, Tolerance::relative(0.05))
        .check_region_aggregation(&df)
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(3.1));

    let (processed, report) = processor(&dir, Tolerance::relative(0.01))
        .check_region_aggregation(&df)
        .unwrap();
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(3.0));
    let row = &report.rows()[0];
    assert_eq!(row.region, "World");
    assert_eq!(row.original, 3.1);
    assert_eq!(row.aggregated, 3.0);
    assert!(is_close!(row.difference_percent, 3.225806451612903));
}

#[test]
fn test_aggregation_without_reported_data() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let df = data(&[("a", "Primary Energy", 1.0), ("b", "Primary Energy", 2.0)]);
    let processed = processor(&dir, Tolerance::default()).apply(&df).unwrap();
    assert_eq!(processed.len(), 3);
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(3.0));
}

#[test]
fn test_duplicate_mappings_are_collected() {
    let dir = project(&[
        ("first.yaml", WORLD_FROM_A_B),
        ("second.yaml", "model: m\nnative_regions: [a]\n"),
        ("third.yaml", "model: other\n"),
    ]);
    let err = MappingRepository::from_directory(&dir.path().join("mappings"), None).unwrap_err();
    assert_eq!(err.errors().len(), 2);

    let message = err.to_string();
    assert!(message.starts_with("2 error(s) in the region mappings"));
    assert!(message.contains("Multiple region aggregation mappings for model m"));
    assert!(message.contains("first.yaml"));
    assert!(message.contains("second.yaml"));
    assert!(message.contains("third.yaml"));
}

#[test]
fn test_undefined_regions_are_collected() {
    let dir = project(&[
        ("first.yaml", "model: m\nnative_regions: [Mars]\n"),
        ("second.yaml", "model: n\ncommon_regions:\n  - Venus: [a]\nexclude_regions: [a]\n"),
    ]);
    let err = RegionProcessor::from_directory(
        &dir.path().join("mappings"),
        definition(&dir),
        Tolerance::default(),
    )
    .unwrap_err();
    let errors = err.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, NomenclatureError::RegionNotDefined { .. })));
}

#[test]
fn test_missing_weight_skips_only_that_variable() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let df = data(&[
        ("a", "Primary Energy", 1.0),
        ("b", "Primary Energy", 2.0),
        ("a", "Price|Carbon", 10.0),
        ("b", "Price|Carbon", 20.0),
        ("a", "Population", 3.0),
    ]);
    let processed = processor(&dir, Tolerance::default()).apply(&df).unwrap();
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(3.0));
    assert_eq!(processed.get(&key("World", "Price|Carbon")), None);
    // native data is kept regardless
    assert_eq!(processed.get(&key("b", "Price|Carbon")), Some(20.0));
}

#[test]
fn test_weighted_average() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let df = data(&[
        ("a", "Price|Carbon", 10.0),
        ("b", "Price|Carbon", 40.0),
        ("a", "Population", 2.0),
        ("b", "Population", 1.0),
    ]);
    let processed = processor(&dir, Tolerance::default()).apply(&df).unwrap();
    assert!(is_close!(
        processed.get(&key("World", "Price|Carbon")).unwrap(),
        20.0
    ));
    assert_eq!(processed.get(&key("World", "Population")), Some(3.0));
}

#[test]
fn test_single_constituent_keeps_all_variables() {
    let dir = project(&[(
        "m.yaml",
        "model: m\ncommon_regions:\n  - Asia: [c]\nexclude_regions: [c]\n",
    )]);
    let df = data(&[("c", "Primary Energy", 1.0), ("c", "Price|Carbon", 50.0)]);
    let processed = processor(&dir, Tolerance::default()).apply(&df).unwrap();
    assert_eq!(processed.len(), 2);
    assert_eq!(processed.get(&key("Asia", "Primary Energy")), Some(1.0));
    // no weight is needed to rename a single region
    assert_eq!(processed.get(&key("Asia", "Price|Carbon")), Some(50.0));
}

#[test]
fn test_rename_targets_fan_out() {
    let dir = project(&[(
        "m.yaml",
        "model: m\ncommon_regions:\n  - World: [a, b, c]\nexclude_regions: [a, b, c]\n",
    )]);
    let df = data(&[
        ("a", "Temperature", 1.0),
        ("b", "Temperature", 2.0),
        ("c", "Temperature", 6.0),
    ]);
    let processed = processor(&dir, Tolerance::default()).apply(&df).unwrap();
    assert_eq!(
        processed.variables().into_iter().collect::<Vec<_>>(),
        vec!["Temperature|Max", "Temperature|Mean"]
    );
    assert_eq!(processed.get(&key("World", "Temperature|Max")), Some(6.0));
    assert!(is_close!(
        processed.get(&key("World", "Temperature|Mean")).unwrap(),
        3.0
    ));
}

#[test]
fn test_revert_rename_only_mapping() {
    let dir = project(&[(
        "m.yaml",
        "model: m\nnative_regions:\n  - a: m|A\n  - b: m|B\n",
    )]);
    let processor = processor(&dir, Tolerance::default());
    let df = data(&[
        ("a", "Primary Energy", 1.0),
        ("b", "Primary Energy", 2.0),
        ("a", "Final Energy", 0.5),
    ]);

    let processed = processor.apply(&df).unwrap();
    assert_eq!(
        processed.regions().into_iter().collect::<Vec<_>>(),
        vec!["m|A", "m|B"]
    );
    assert_eq!(processor.revert(&processed).unwrap(), df);
}

#[test]
fn test_processing_is_idempotent() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let processor = processor(&dir, Tolerance::default());
    let df = data(&[
        ("a", "Primary Energy", 1.0),
        ("b", "Primary Energy", 2.0),
        ("World", "Primary Energy", 5.0),
    ]);

    let (first, report) = processor.check_region_aggregation(&df).unwrap();
    assert_eq!(report.len(), 1);
    let (second, report) = processor.check_region_aggregation(&first).unwrap();
    assert!(report.is_empty());
    assert_eq!(second, first);
}

#[test]
fn test_csv_registration() {
    let dir = project(&[(
        "m.csv",
        "model,m\nnative_region,renamed,Macro\na,m|A,World\nb,m|B,World\nc,,Asia\n",
    )]);
    let processor = processor(&dir, Tolerance::default());
    assert!(processor.repository().contains("m"));

    let df = data(&[
        ("a", "Primary Energy", 1.0),
        ("b", "Primary Energy", 2.0),
        ("c", "Primary Energy", 4.0),
    ]);
    let processed = processor.apply(&df).unwrap();
    assert_eq!(
        processed.regions().into_iter().collect::<Vec<_>>(),
        vec!["Asia", "World", "c", "m|A", "m|B"]
    );
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(3.0));
    assert_eq!(processed.get(&key("Asia", "Primary Energy")), Some(4.0));
}

#[test]
fn test_pipeline_validates_processed_regions() {
    let dir = project(&[("m.yaml", WORLD_FROM_A_B)]);
    let dsd = definition(&dir);
    let processor = processor(&dir, Tolerance::default());
    let df = data(&[("a", "Primary Energy", 1.0), ("b", "Primary Energy", 2.0)]);

    let processed = process(&df, &dsd, &[&processor]).unwrap();
    assert_eq!(processed.get(&key("World", "Primary Energy")), Some(3.0));

    let invalid = data(&[("a", "Undefined", 1.0)]);
    let err = process(&invalid, &dsd, &[&processor]).unwrap_err();
    assert!(err.to_string().contains("Undefined"));
}
