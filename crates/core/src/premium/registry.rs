use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Substrings dropped before fuzzy product comparison.
const INSIGNIFICANT_TOKENS: [&str; 4] = ["activ", "premium", "chart", "xlsx"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub excel_path: PathBuf,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("premium registry `{0}` does not exist")]
    NotFound(PathBuf),
    #[error("could not read premium registry `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse premium registry `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("premium registry `{0}` has no products")]
    Empty(PathBuf),
}

/// Product key → workbook path mapping, iterated in sorted key order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateTableRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl RateTableRegistry {
    pub fn new(entries: BTreeMap<String, RegistryEntry>) -> Self {
        Self { entries }
    }

    /// Reads the registry JSON. Relative `excel_path` values resolve against
    /// the registry file's directory.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)
            .map_err(|source| RegistryError::Read { path: path.to_path_buf(), source })?;
        let mut entries: BTreeMap<String, RegistryEntry> = serde_json::from_str(&raw)
            .map_err(|source| RegistryError::Parse { path: path.to_path_buf(), source })?;
        if entries.is_empty() {
            return Err(RegistryError::Empty(path.to_path_buf()));
        }

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for entry in entries.values_mut() {
            if entry.excel_path.is_relative() {
                entry.excel_path = base.join(&entry.excel_path);
            }
        }

        Ok(Self { entries })
    }

    pub fn product_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a free-form product name to a registry key.
    pub fn resolve(&self, requested: &str) -> Option<(&str, &RegistryEntry)> {
        let key = match_product(requested, self.entries.keys().map(String::as_str))?;
        self.entries.get_key_value(key).map(|(key, entry)| (key.as_str(), entry))
    }
}

/// Matches `requested` against `keys`: case-insensitive equality first, then
/// normalized equality, then normalized containment in either direction.
pub fn match_product<'a, I>(requested: &str, keys: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let keys: Vec<&'a str> = keys.into_iter().collect();
    let requested = requested.trim();
    if requested.is_empty() {
        return None;
    }

    if let Some(key) = keys.iter().copied().find(|key| key.eq_ignore_ascii_case(requested)) {
        return Some(key);
    }

    let wanted = normalize_product_name(requested);
    if wanted.is_empty() {
        return None;
    }
    let normalized: Vec<(&'a str, String)> =
        keys.iter().map(|key| (*key, normalize_product_name(key))).collect();

    if let Some((key, _)) = normalized.iter().find(|(_, name)| *name == wanted) {
        debug!(event_name = "premium.registry.normalized_match", requested, key = *key, "matched product");
        return Some(*key);
    }

    let contained = normalized
        .iter()
        .find(|(_, name)| !name.is_empty() && (name.contains(&wanted) || wanted.contains(name.as_str())));
    if let Some((key, _)) = contained {
        debug!(event_name = "premium.registry.partial_match", requested, key = *key, "matched product");
        return Some(*key);
    }

    None
}

pub fn normalize_product_name(name: &str) -> String {
    let mut normalized: String = name
        .to_lowercase()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '_' | '-' | '.'))
        .collect();
    for token in INSIGNIFICANT_TOKENS {
        normalized = normalized.replace(token, "");
    }
    normalized
}
