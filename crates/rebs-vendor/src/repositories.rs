//! Persistent repository key → ID map.
//!
//! Cached repositories live under `<scratch root>/repositories/<id>`,
//! shared across optimization levels. Keys are `"<type>#<url>"` strings.
//! The map persists as JSON; a fresh ID reclaims any stale directory left
//! at its path by an interrupted earlier run. Loading is tolerant: a
//! missing or corrupt map starts empty.

use rebs_build::layout::{delete_folder_if_exists, ensure_directories_exist};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The name of the map file inside the repositories directory.
const REPOSITORIES_MAP_FILE: &str = "repositories.json";

/// The subdirectory of the scratch root hosting cached repositories.
const REPOSITORIES_SUBDIRECTORY: &str = "repositories";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryMapFile {
    #[serde(rename = "repositoriesToIds", default)]
    repositories_to_ids: BTreeMap<String, u64>,
    #[serde(rename = "nextRepositoryId", default)]
    next_repository_id: u64,
}

#[derive(Debug)]
pub struct RepositoryRegistry {
    repositories_dir: PathBuf,
    map: RepositoryMapFile,
    dirty: bool,
}

/// The map key for a repository: its type and URL.
pub fn repository_key(repository_type: &str, url: &str) -> String {
    format!("{repository_type}#{url}")
}

impl RepositoryRegistry {
    /// Loads the map from under `scratch_root`. Parse errors leave an
    /// empty map.
    pub fn load(scratch_root: &Path) -> Self {
        let repositories_dir = scratch_root.join(REPOSITORIES_SUBDIRECTORY);
        let map_path = repositories_dir.join(REPOSITORIES_MAP_FILE);

        let map = match fs::read_to_string(&map_path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|error| {
                eprintln!("Error reading {}: {error}", map_path.display());
                RepositoryMapFile::default()
            }),
            Err(_) => {
                ensure_directories_exist(&repositories_dir);
                RepositoryMapFile::default()
            }
        };

        Self {
            repositories_dir,
            map,
            dirty: false,
        }
    }

    /// The cache directory for a repository key, allocating an ID on first
    /// sight. A freshly allocated ID deletes any stale directory already at
    /// its path.
    pub fn directory_for_key(&mut self, key: &str) -> PathBuf {
        if let Some(id) = self.map.repositories_to_ids.get(key) {
            return self.repositories_dir.join(id.to_string());
        }

        let id = self.map.next_repository_id;
        self.map.next_repository_id += 1;
        self.map.repositories_to_ids.insert(key.to_string(), id);
        self.dirty = true;

        let directory = self.repositories_dir.join(id.to_string());
        delete_folder_if_exists(&directory);
        directory
    }

    /// The directory every cached repository lives under.
    pub fn repositories_dir(&self) -> &Path {
        &self.repositories_dir
    }

    /// Writes the map back if anything was allocated.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        ensure_directories_exist(&self.repositories_dir);
        let map_path = self.repositories_dir.join(REPOSITORIES_MAP_FILE);
        match serde_json::to_string_pretty(&self.map) {
            Ok(contents) => match fs::write(&map_path, contents) {
                Ok(()) => self.dirty = false,
                Err(error) => eprintln!("Error writing {}: {error}", map_path.display()),
            },
            Err(error) => eprintln!("Error writing {}: {error}", map_path.display()),
        }
    }
}
