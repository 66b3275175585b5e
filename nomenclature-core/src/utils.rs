//! Small helpers shared by the loaders.

use crate::errors::{NomenclatureError, NomenclatureResult};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Deserialize either a single value or a list of values into an optional list.
///
/// Used for fields such as `model: M` vs `model: [M1, M2]`.
pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(
        Option::<OneOrMany<T>>::deserialize(deserializer)?.map(|v| match v {
            OneOrMany::One(x) => vec![x],
            OneOrMany::Many(xs) => xs,
        }),
    )
}

/// Match `value` against a pattern where `*` stands for any (possibly empty) sequence.
pub fn pattern_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == value;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = value;

    // first part anchors at the start, last part at the end
    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    let last = parts[parts.len() - 1];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Characters which render like a space but break matching of codes
const ILLEGAL_CHARS: [char; 1] = ['\u{202f}'];

/// All `.yaml`/`.yml` files below `dir`, sorted for deterministic processing.
///
/// Files starting with `tag_` are skipped.
pub fn yaml_files(dir: &Path) -> NomenclatureResult<Vec<PathBuf>> {
    find_yaml_files(dir, false)
}

fn find_yaml_files(dir: &Path, include_tags: bool) -> NomenclatureResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| NomenclatureError::Error(format!("{e}")))?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|x| x.to_str()),
            Some("yaml") | Some("yml")
        );
        let is_tag = path
            .file_name()
            .and_then(|x| x.to_str())
            .is_some_and(|x| x.starts_with("tag_"));
        if entry.file_type().is_file() && is_yaml && (include_tags || !is_tag) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Check that every YAML file below `dir` (tag files included) parses and contains no
/// illegal characters, returning the number of files checked.
pub fn validate_yaml(dir: &Path) -> NomenclatureResult<usize> {
    let files = find_yaml_files(dir, true)?;
    let mut errors = Vec::new();
    for file in &files {
        let content = match read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let name = relative_path(file);
        if let Err(e) = serde_yaml::from_str::<serde_yaml::Value>(&content) {
            errors.push(NomenclatureError::Parse {
                file: name.clone(),
                details: e.to_string(),
            });
        }
        for (line, text) in content.lines().enumerate() {
            for (col, c) in text.chars().enumerate() {
                if ILLEGAL_CHARS.contains(&c) {
                    errors.push(NomenclatureError::Parse {
                        file: name.clone(),
                        details: format!(
                            "unexpected special character {:?} at line {}, col {}",
                            c,
                            line + 1,
                            col + 1
                        ),
                    });
                }
            }
        }
    }
    NomenclatureError::collect("in the YAML files", errors)?;
    Ok(files.len())
}

/// Read a file into a string, attaching the path to any I/O error.
pub fn read_to_string(path: &Path) -> NomenclatureResult<String> {
    std::fs::read_to_string(path).map_err(|source| NomenclatureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Path relative to the current working directory where possible, for error messages.
pub fn relative_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
