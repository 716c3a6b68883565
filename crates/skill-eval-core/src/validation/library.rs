//! Skill library discovery with a read-through cache.
//!
//! Skills live at `<root>/<layout>/<domain>/<skill>/skill.json` with an
//! optional sibling `metadata.yaml`. `<layout>` is `executable/` and/or
//! `context/` when either exists; otherwise domains sit directly under the
//! root. A definition is read from disk at most once per id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::domain::{HarnessError, Result, SkillDefinition, SkillMetadata};

const SKILL_FILE: &str = "skill.json";
const METADATA_FILE: &str = "metadata.yaml";
const LAYOUT_DIRS: [&str; 2] = ["executable", "context"];

/// Why a definition could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Skill '{skill_id}' not found in {location}")]
    NotFound { skill_id: String, location: String },

    #[error("failed to read skills library: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
struct CacheState {
    definitions: HashMap<String, Arc<SkillDefinition>>,
    metadata: HashMap<String, Arc<SkillMetadata>>,
    skill_dirs: HashMap<String, PathBuf>,
}

/// Definitions and metadata, from disk and/or registered in memory.
#[derive(Debug)]
pub struct SkillLibrary {
    root: Option<PathBuf>,
    cache: Mutex<CacheState>,
}

impl SkillLibrary {
    /// Disk-backed library. The root must exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(HarnessError::LibraryNotFound(root));
        }
        Ok(Self {
            root: Some(root),
            cache: Mutex::new(CacheState::default()),
        })
    }

    /// Library with no disk backing; skills must be registered.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            cache: Mutex::new(CacheState::default()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Register (or replace) a definition and its optional metadata.
    pub fn register(&self, definition: SkillDefinition, metadata: Option<SkillMetadata>) {
        let mut cache = self.lock();
        let id = definition.id.clone();
        if let Some(meta) = metadata {
            cache.metadata.insert(id.clone(), Arc::new(meta));
        }
        cache.definitions.insert(id, Arc::new(definition));
    }

    /// Fetch a definition, scanning the library on first use.
    pub fn definition(&self, skill_id: &str) -> std::result::Result<Arc<SkillDefinition>, LookupError> {
        if let Some(def) = self.lock().definitions.get(skill_id) {
            return Ok(Arc::clone(def));
        }

        let Some(root) = self.root.as_deref() else {
            return Err(LookupError::NotFound {
                skill_id: skill_id.to_string(),
                location: "in-memory registry".to_string(),
            });
        };

        match scan_for_skill(root, skill_id)? {
            Some((definition, dir)) => {
                let definition = Arc::new(definition);
                let mut cache = self.lock();
                cache
                    .definitions
                    .insert(skill_id.to_string(), Arc::clone(&definition));
                cache.skill_dirs.insert(skill_id.to_string(), dir);
                Ok(definition)
            }
            None => Err(LookupError::NotFound {
                skill_id: skill_id.to_string(),
                location: root.display().to_string(),
            }),
        }
    }

    /// Fetch metadata. Missing or unreadable metadata is `None`; it is never
    /// an error, because callers fall back to a default risk level.
    pub fn metadata(&self, skill_id: &str) -> Option<Arc<SkillMetadata>> {
        let dir = {
            let cache = self.lock();
            if let Some(meta) = cache.metadata.get(skill_id) {
                return Some(Arc::clone(meta));
            }
            cache.skill_dirs.get(skill_id).cloned()
        };

        let dir = match dir {
            Some(dir) => dir,
            None => {
                // Populates skill_dirs for disk-backed skills.
                self.definition(skill_id).ok()?;
                self.lock().skill_dirs.get(skill_id).cloned()?
            }
        };

        let path = dir.join(METADATA_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(skill_id, path = %path.display(), error = %e, "failed to read metadata");
                return None;
            }
        };
        match serde_yaml::from_str::<SkillMetadata>(&raw) {
            Ok(meta) => {
                let meta = Arc::new(meta);
                self.lock()
                    .metadata
                    .insert(skill_id.to_string(), Arc::clone(&meta));
                Some(meta)
            }
            Err(e) => {
                warn!(skill_id, path = %path.display(), error = %e, "malformed metadata");
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `executable/` and `context/` when present, else the root itself.
fn search_roots(root: &Path) -> Vec<PathBuf> {
    let layouts: Vec<PathBuf> = LAYOUT_DIRS
        .iter()
        .map(|d| root.join(d))
        .filter(|p| p.is_dir())
        .collect();
    if layouts.is_empty() {
        vec![root.to_path_buf()]
    } else {
        layouts
    }
}

fn sorted_subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn scan_for_skill(
    root: &Path,
    skill_id: &str,
) -> std::io::Result<Option<(SkillDefinition, PathBuf)>> {
    for search_root in search_roots(root) {
        for domain_dir in sorted_subdirs(&search_root)? {
            for skill_dir in sorted_subdirs(&domain_dir)? {
                let skill_path = skill_dir.join(SKILL_FILE);
                if !skill_path.is_file() {
                    continue;
                }
                let raw = std::fs::read_to_string(&skill_path)?;
                let definition: SkillDefinition = match serde_json::from_str(&raw) {
                    Ok(def) => def,
                    Err(e) => {
                        debug!(path = %skill_path.display(), error = %e, "skipping unparseable skill.json");
                        continue;
                    }
                };
                if definition.id == skill_id {
                    return Ok(Some((definition, skill_dir)));
                }
            }
        }
    }
    Ok(None)
}
