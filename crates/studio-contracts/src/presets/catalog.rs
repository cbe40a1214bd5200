use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use super::group::{PresetGroup, StyleMode, StylePreset, SubjectCategory};

const BUILTIN_PRESETS_JSON: &str = include_str!("../../resources/presets.json");

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset catalog is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("failed reading preset catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("preset group {category}/{mode} is defined twice")]
    DuplicateGroup {
        category: SubjectCategory,
        mode: StyleMode,
    },

    #[error("preset id '{id}' appears twice in group {category}/{mode}")]
    DuplicateId {
        category: SubjectCategory,
        mode: StyleMode,
        id: String,
    },

    #[error("preset '{id}' has an empty id, name or prompt")]
    Incomplete { id: String },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    groups: Vec<GroupFile>,
}

#[derive(Debug, Deserialize)]
struct GroupFile {
    category: SubjectCategory,
    mode: StyleMode,
    #[serde(default)]
    suffix: String,
    presets: Vec<PresetFile>,
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    id: String,
    name: String,
    prompt: String,
}

/// Style presets keyed by (subject category, style mode), in file order.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    groups: IndexMap<(SubjectCategory, StyleMode), PresetGroup>,
}

impl PresetCatalog {
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_PRESETS_JSON).unwrap_or_else(|err| {
            log::error!("built-in preset catalog rejected: {err}");
            Self {
                groups: IndexMap::new(),
            }
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, PresetError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut groups = IndexMap::new();
        for group in file.groups {
            let key = (group.category, group.mode);
            if groups.contains_key(&key) {
                return Err(PresetError::DuplicateGroup {
                    category: group.category,
                    mode: group.mode,
                });
            }
            groups.insert(key, build_group(group)?);
        }
        Ok(Self { groups })
    }

    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// `path` wins over the built-in catalog when given.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, PresetError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn group(&self, category: SubjectCategory, mode: StyleMode) -> Option<&PresetGroup> {
        self.groups.get(&(category, mode))
    }

    /// Presets for a selection; empty when the catalog has no such group.
    pub fn presets(&self, category: SubjectCategory, mode: StyleMode) -> &[StylePreset] {
        self.group(category, mode)
            .map(|group| group.presets.as_slice())
            .unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = &PresetGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(|group| group.presets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_group(group: GroupFile) -> Result<PresetGroup, PresetError> {
    let suffix = group.suffix.trim();
    let mut seen = HashSet::new();
    let mut presets = Vec::with_capacity(group.presets.len());
    for preset in group.presets {
        let id = preset.id.trim().to_string();
        let body = preset.prompt.trim();
        if id.is_empty() || preset.name.trim().is_empty() || body.is_empty() {
            return Err(PresetError::Incomplete { id });
        }
        if !seen.insert(id.clone()) {
            return Err(PresetError::DuplicateId {
                category: group.category,
                mode: group.mode,
                id,
            });
        }
        let prompt_text = if suffix.is_empty() {
            body.to_string()
        } else {
            format!("{body} {suffix}")
        };
        presets.push(StylePreset {
            id,
            display_name: preset.name.trim().to_string(),
            prompt_text,
        });
    }
    Ok(PresetGroup {
        category: group.category,
        mode: group.mode,
        presets,
    })
}
