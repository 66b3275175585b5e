use super::mapping::RegionMapping;
use nomenclature_core::definition::DataStructureDefinition;
use nomenclature_core::errors::{NomenclatureError, NomenclatureResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Region mappings indexed by model name.
///
/// A mapping declaring several models is shared between them.
#[derive(Debug, Clone, Default)]
pub struct MappingRepository {
    mappings: BTreeMap<String, Arc<RegionMapping>>,
}

impl MappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index already parsed mappings, collecting every model declared more than once
    ///
    /// If `dsd` is given, the target regions of every mapping are checked against the
    /// region codelist and undefined regions are collected as well.
    pub fn from_mappings<I>(
        mappings: I,
        dsd: Option<&DataStructureDefinition>,
    ) -> NomenclatureResult<Self>
    where
        I: IntoIterator<Item = RegionMapping>,
    {
        let mut repository = Self::new();
        let mut errors = Vec::new();
        for mapping in mappings {
            errors.extend(repository.register(mapping, dsd));
        }
        NomenclatureError::collect("in the region mappings", errors)?;
        Ok(repository)
    }

    /// Load all mappings in a directory.
    ///
    /// `.yaml`/`.yml` files are read as mapping files, `.csv` files as tabular
    /// registrations. Parsing and structural errors, duplicate models and (if `dsd` is
    /// given) undefined regions are collected over all files and raised together.
    pub fn from_directory(
        path: &Path,
        dsd: Option<&DataStructureDefinition>,
    ) -> NomenclatureResult<Self> {
        let mut repository = Self::new();
        repository.load_directory(path, dsd)?;
        Ok(repository)
    }

    /// Add the mappings in a directory to those already registered.
    ///
    /// A model which already has a mapping is reported as a collision, mappings are never
    /// overridden. On error the repository is left unchanged.
    pub fn load_directory(
        &mut self,
        path: &Path,
        dsd: Option<&DataStructureDefinition>,
    ) -> NomenclatureResult<()> {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| NomenclatureError::Error(e.to_string()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        let mut staged = self.clone();
        let mut errors = Vec::new();
        for file in files {
            let parsed = match file.extension().and_then(|x| x.to_str()) {
                Some("yaml") | Some("yml") => RegionMapping::from_yaml_file(&file),
                Some("csv") => RegionMapping::from_csv_file(&file),
                _ => continue,
            };
            match parsed {
                Ok(mapping) => {
                    debug!(file = mapping.file(), models = ?mapping.models(), "Loaded region mapping");
                    errors.extend(staged.register(mapping, dsd));
                }
                Err(e) => errors.push(e),
            }
        }
        NomenclatureError::collect("in the region mappings", errors)?;
        *self = staged;
        Ok(())
    }

    /// Register a mapping for all its models, returning the problems found
    fn register(
        &mut self,
        mapping: RegionMapping,
        dsd: Option<&DataStructureDefinition>,
    ) -> Vec<NomenclatureError> {
        let mut errors = Vec::new();
        if let Some(dsd) = dsd {
            if let Err(e) = mapping.validate_regions(dsd) {
                errors.push(e);
            }
        }

        let mapping = Arc::new(mapping);
        for model in mapping.models() {
            match self.mappings.get(model) {
                Some(existing) => errors.push(NomenclatureError::ModelMappingCollision {
                    model: model.clone(),
                    file1: existing.file().to_string(),
                    file2: mapping.file().to_string(),
                }),
                None => {
                    self.mappings.insert(model.clone(), Arc::clone(&mapping));
                }
            }
        }
        errors
    }

    pub fn lookup(&self, model: &str) -> Option<&RegionMapping> {
        self.mappings.get(model).map(|m| m.as_ref())
    }

    pub fn contains(&self, model: &str) -> bool {
        self.mappings.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(|m| m.as_str())
    }

    /// Distinct mappings, each once even if it covers several models
    pub fn mappings(&self) -> Vec<&RegionMapping> {
        let mut seen: Vec<&Arc<RegionMapping>> = Vec::new();
        for mapping in self.mappings.values() {
            if !seen.iter().any(|m| Arc::ptr_eq(m, mapping)) {
                seen.push(mapping);
            }
        }
        seen.into_iter().map(|m| m.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Check the target regions of every mapping against the region codelist, collecting errors
    pub fn validate_regions(&self, dsd: &DataStructureDefinition) -> NomenclatureResult<()> {
        let errors = self
            .mappings()
            .into_iter()
            .filter_map(|m| m.validate_regions(dsd).err())
            .collect();
        NomenclatureError::collect("in the region mappings", errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomenclature_core::codelist::{RegionCodeList, VariableCodeList};
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.yaml",
            "model: [model_a, model_b]\nnative_regions: [region_a]\n",
        );
        write(
            dir.path(),
            "c.csv",
            "model,model_c\nnative_region,renamed,World\nregion_a,,World\n",
        );
        write(dir.path(), "README.md", "not a mapping");

        let repository = MappingRepository::from_directory(dir.path(), None).unwrap();
        assert_eq!(
            repository.models().collect::<Vec<_>>(),
            vec!["model_a", "model_b", "model_c"]
        );
        assert_eq!(repository.mappings().len(), 2);
        assert!(repository.lookup("model_d").is_none());
        assert_eq!(
            repository.lookup("model_b").unwrap().file(),
            repository.lookup("model_a").unwrap().file()
        );
    }

    #[test]
    fn test_errors_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "model: M\nnative_regions: [r1]\n");
        write(dir.path(), "b.yaml", "model: M\nnative_regions: [r2]\n");
        write(dir.path(), "c.yaml", "model: N\nnative_regions: [r1, r1]\n");

        let err = MappingRepository::from_directory(dir.path(), None).unwrap_err();
        let errors = err.errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors[0],
            NomenclatureError::ModelMappingCollision { .. }
        ));
        assert!(matches!(
            errors[1],
            NomenclatureError::RegionNameCollision { .. }
        ));
    }

    #[test]
    fn test_undefined_regions_are_collected() {
        let dsd = DataStructureDefinition::new(
            RegionCodeList::from_names("common", &["World"]).unwrap(),
            VariableCodeList::default(),
        );
        let mappings = [
            RegionMapping::from_yaml_str("model: M\nnative_regions: [Mars]\n", "a.yaml").unwrap(),
            RegionMapping::from_yaml_str("model: M\nnative_regions: [World]\n", "b.yaml").unwrap(),
        ];
        let err = MappingRepository::from_mappings(mappings, Some(&dsd)).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("2 error(s)"));
        assert!(message.contains("Mars"));
        assert!(message.contains("[a.yaml, b.yaml]"));
    }

    #[test]
    fn test_layered_sources() {
        let external = RegionMapping::from_yaml_str(
            "model: M\nnative_regions: [r1]\n",
            "external/m.yaml",
        )
        .unwrap();
        let mut repository = MappingRepository::from_mappings([external], None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m.yaml", "model: M\nnative_regions: [r2]\n");
        write(dir.path(), "n.yaml", "model: N\nnative_regions: [r2]\n");
        let err = repository.load_directory(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("external/m.yaml"));

        // a failed load leaves the repository untouched
        assert_eq!(repository.lookup("M").unwrap().file(), "external/m.yaml");
        assert!(!repository.contains("N"));
        assert_eq!(repository.len(), 1);

        fs::remove_file(dir.path().join("m.yaml")).unwrap();
        repository.load_directory(dir.path(), None).unwrap();
        assert_eq!(repository.models().collect::<Vec<_>>(), vec!["M", "N"]);
    }
}
