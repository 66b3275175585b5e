//! Region-processing definition of one or several models.
//!
//! A mapping file declares which model native regions are kept (and optionally renamed),
//! which common regions are computed from them and which regions are ignored:
//!
//! ```yaml
//! model: model_a
//! native_regions:
//!   - region_a: model_a|Region A
//!   - region_b
//! common_regions:
//!   - World:
//!     - region_a
//!     - region_b
//! exclude_regions:
//!   - region_c
//! ```
//!
//! The same information can be registered as a CSV table, see [`RegionMapping::from_csv_file`].

use nomenclature_core::definition::DataStructureDefinition;
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use nomenclature_core::utils::{one_or_many, read_to_string, relative_path};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A region reported by a model, kept in the processed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRegion {
    pub name: String,
    pub rename: Option<String>,
}

impl NativeRegion {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rename: None,
        }
    }

    pub fn renamed(name: &str, rename: &str) -> Self {
        Self {
            name: name.to_string(),
            rename: Some(rename.to_string()),
        }
    }

    /// Name of the region in the processed data
    pub fn target_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.name)
    }
}

/// A region used for comparison across models, computed from native regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonRegion {
    pub name: String,
    /// Original (not renamed) names of the native regions
    pub constituent_regions: Vec<String>,
}

impl CommonRegion {
    pub fn new<S: AsRef<str>>(name: &str, constituent_regions: &[S]) -> Self {
        Self {
            name: name.to_string(),
            constituent_regions: constituent_regions
                .iter()
                .map(|r| r.as_ref().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NativeRegionInput {
    Name(String),
    Renamed(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingInput {
    #[serde(deserialize_with = "one_or_many")]
    model: Option<Vec<String>>,
    #[serde(default)]
    native_regions: Option<Vec<NativeRegionInput>>,
    #[serde(default)]
    common_regions: Option<Vec<BTreeMap<String, Vec<String>>>>,
    #[serde(default)]
    exclude_regions: Option<Vec<String>>,
}

fn duplicates<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            duplicates.insert(name.to_string());
        }
    }
    duplicates.into_iter().collect()
}

/// Native-region selection, renaming and common-region aggregation for a set of models.
///
/// The mapping is validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMapping {
    models: Vec<String>,
    native_regions: Vec<NativeRegion>,
    common_regions: Vec<CommonRegion>,
    exclude_regions: Vec<String>,
    file: String,
}

impl RegionMapping {
    /// Create a mapping, checking its internal consistency
    ///
    /// `file` is used as reference in error messages.
    pub fn new(
        models: Vec<String>,
        native_regions: Vec<NativeRegion>,
        common_regions: Vec<CommonRegion>,
        exclude_regions: Vec<String>,
        file: &str,
    ) -> NomenclatureResult<Self> {
        let mapping = Self {
            models,
            native_regions,
            common_regions,
            exclude_regions,
            file: file.to_string(),
        };
        mapping.check()?;
        Ok(mapping)
    }

    fn collision(&self, location: &str, duplicates: Vec<String>) -> Option<NomenclatureError> {
        (!duplicates.is_empty()).then(|| NomenclatureError::RegionNameCollision {
            location: location.to_string(),
            duplicates,
            file: self.file.clone(),
        })
    }

    /// Structural checks, all violations of a file are reported together
    fn check(&self) -> NomenclatureResult<()> {
        if self.models.is_empty() {
            return Err(NomenclatureError::Parse {
                file: self.file.clone(),
                details: "at least one model must be given".to_string(),
            });
        }
        if self.native_regions.is_empty() && self.common_regions.is_empty() {
            return Err(NomenclatureError::NoRegionsDefined {
                file: self.file.clone(),
            });
        }

        let mut errors = Vec::new();
        let mut native = duplicates(self.native_regions.iter().map(|r| r.target_name()));
        native.extend(duplicates(self.native_regions.iter().map(|r| r.name.as_str())));
        native.sort();
        native.dedup();
        errors.extend(self.collision("native regions", native));
        errors.extend(self.collision(
            "common regions",
            duplicates(self.common_regions.iter().map(|r| r.name.as_str())),
        ));

        let common_names = self.common_region_names();
        let overlap: Vec<String> = self
            .native_regions
            .iter()
            .map(|r| r.target_name())
            .filter(|name| common_names.contains(name))
            .map(|name| name.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        errors.extend(self.collision("native and common regions", overlap));

        let allowed_constituents: BTreeSet<&str> = self
            .native_regions
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.exclude_regions.iter().map(|r| r.as_str()))
            .collect();
        for common_region in &self.common_regions {
            if common_region
                .constituent_regions
                .contains(&common_region.name)
            {
                errors.push(NomenclatureError::SelfReferencingCommonRegion {
                    region: common_region.name.clone(),
                    file: self.file.clone(),
                });
            }
            let missing: Vec<String> = common_region
                .constituent_regions
                .iter()
                .filter(|r| *r != &common_region.name)
                .filter(|r| !allowed_constituents.contains(r.as_str()))
                .cloned()
                .collect();
            if common_region.constituent_regions.is_empty() || !missing.is_empty() {
                errors.push(NomenclatureError::MissingConstituentRegions {
                    common_region: common_region.name.clone(),
                    regions: missing,
                    file: self.file.clone(),
                });
            }
        }

        let excluded: BTreeSet<&str> = self.exclude_regions.iter().map(|r| r.as_str()).collect();
        for (region_type, names) in [
            ("native_regions", self.native_name_set()),
            ("common_regions", common_names),
        ] {
            let overlap: Vec<String> = names
                .intersection(&excluded)
                .map(|r| r.to_string())
                .collect();
            if !overlap.is_empty() {
                errors.push(NomenclatureError::ExcludeRegionOverlap {
                    regions: overlap,
                    region_type: region_type.to_string(),
                    file: self.file.clone(),
                });
            }
        }
        NomenclatureError::collect(format!("in the region mapping {}", self.file), errors)
    }

    /// Parse a mapping from YAML, `file` is used as reference in error messages
    pub fn from_yaml_str(content: &str, file: &str) -> NomenclatureResult<Self> {
        let input: MappingInput =
            serde_yaml::from_str(content).map_err(|e| NomenclatureError::Parse {
                file: file.to_string(),
                details: e.to_string(),
            })?;

        let mut native_regions = Vec::new();
        for entry in input.native_regions.unwrap_or_default() {
            match entry {
                NativeRegionInput::Name(name) => native_regions.push(NativeRegion::new(&name)),
                NativeRegionInput::Renamed(map) if map.len() == 1 => {
                    native_regions.extend(
                        map.iter()
                            .map(|(name, rename)| NativeRegion::renamed(name, rename)),
                    );
                }
                NativeRegionInput::Renamed(map) => {
                    return Err(NomenclatureError::Parse {
                        file: file.to_string(),
                        details: format!(
                            "a renamed native region must be a single `name: rename` pair, found {:?}",
                            map.keys().collect::<Vec<_>>()
                        ),
                    });
                }
            }
        }

        let common_regions = input
            .common_regions
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|(name, constituents)| CommonRegion {
                name,
                constituent_regions: constituents,
            })
            .collect();

        Self::new(
            input.model.unwrap_or_default(),
            native_regions,
            common_regions,
            input.exclude_regions.unwrap_or_default(),
            file,
        )
    }

    pub fn from_yaml_file(path: &Path) -> NomenclatureResult<Self> {
        Self::from_yaml_str(&read_to_string(path)?, &relative_path(path))
    }

    /// Parse a mapping from the tabular registration format.
    ///
    /// ```text
    /// model,model_a
    /// native_region,renamed,R5,World
    /// region_a,model_a|Region A,R5ASIA,World
    /// region_b,,R5ASIA,World
    /// ```
    ///
    /// The first record names the model(s). Each column after `renamed` is a grouping of
    /// native regions into common regions: the cell names the common region the native
    /// region belongs to, an empty cell leaves it out of that grouping.
    pub fn from_csv_str(content: &str, file: &str) -> NomenclatureResult<Self> {
        let parse_error = |details: String| NomenclatureError::Parse {
            file: file.to_string(),
            details,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record.map_err(|e| parse_error(e.to_string()))?);
        }
        let mut records = records.into_iter().filter(|r| r.iter().any(|c| !c.is_empty()));

        let models: Vec<String> = match records.next() {
            Some(record) if record.get(0).is_some_and(|c| c.eq_ignore_ascii_case("model")) => {
                record
                    .iter()
                    .skip(1)
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_string())
                    .collect()
            }
            _ => return Err(parse_error("first record must be `model,<name>`".to_string())),
        };

        let header = match records.next() {
            Some(header)
                if header.get(0) == Some("native_region") && header.get(1) == Some("renamed") =>
            {
                header
            }
            _ => {
                return Err(parse_error(
                    "second record must be the header `native_region,renamed,...`".to_string(),
                ))
            }
        };

        let mut native_regions = Vec::new();
        // common region -> constituents, in order of first appearance
        let mut common_regions: Vec<CommonRegion> = Vec::new();
        for record in records {
            let name = record.get(0).unwrap_or_default();
            if name.is_empty() {
                return Err(parse_error(format!(
                    "missing native region name in record {:?}",
                    record.iter().collect::<Vec<_>>()
                )));
            }
            match record.get(1).filter(|r| !r.is_empty()) {
                Some(rename) => native_regions.push(NativeRegion::renamed(name, rename)),
                None => native_regions.push(NativeRegion::new(name)),
            }
            for column in 2..header.len() {
                let Some(common) = record.get(column).filter(|c| !c.is_empty()) else {
                    continue;
                };
                match common_regions.iter_mut().find(|c| c.name == common) {
                    Some(existing) => existing.constituent_regions.push(name.to_string()),
                    None => common_regions.push(CommonRegion::new(common, &[name])),
                }
            }
        }

        Self::new(models, native_regions, common_regions, vec![], file)
    }

    pub fn from_csv_file(path: &Path) -> NomenclatureResult<Self> {
        Self::from_csv_str(&read_to_string(path)?, &relative_path(path))
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn native_regions(&self) -> &[NativeRegion] {
        &self.native_regions
    }

    pub fn common_regions(&self) -> &[CommonRegion] {
        &self.common_regions
    }

    pub fn exclude_regions(&self) -> &[String] {
        &self.exclude_regions
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Regions in the processed data: native target names and common-region names
    pub fn all_target_region_names(&self) -> BTreeSet<&str> {
        self.native_regions
            .iter()
            .map(|r| r.target_name())
            .chain(self.common_regions.iter().map(|r| r.name.as_str()))
            .collect()
    }

    /// Original names of the native regions
    pub fn native_name_set(&self) -> BTreeSet<&str> {
        self.native_regions.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn common_region_names(&self) -> BTreeSet<&str> {
        self.common_regions.iter().map(|r| r.name.as_str()).collect()
    }

    /// All regions the mapping knows about, processed or not
    pub fn known_regions(&self) -> BTreeSet<&str> {
        let mut known = self.native_name_set();
        known.extend(self.common_region_names());
        known.extend(
            self.common_regions
                .iter()
                .flat_map(|r| r.constituent_regions.iter().map(|c| c.as_str())),
        );
        known.extend(self.exclude_regions.iter().map(|r| r.as_str()));
        known
    }

    /// Original native name to target name, for renamed regions only
    pub fn rename_table(&self) -> BTreeMap<String, String> {
        self.native_regions
            .iter()
            .filter_map(|r| r.rename.as_ref().map(|t| (r.name.clone(), t.clone())))
            .collect()
    }

    pub fn reverse_rename_table(&self) -> BTreeMap<String, String> {
        self.rename_table().into_iter().map(|(k, v)| (v, k)).collect()
    }

    /// Check that all target regions are defined in the region codelist
    pub fn validate_regions(&self, dsd: &DataStructureDefinition) -> NomenclatureResult<()> {
        let invalid = dsd.region.validate_items(self.all_target_region_names());
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(NomenclatureError::RegionNotDefined {
                regions: invalid,
                file: self.file.clone(),
            })
        }
    }
}
