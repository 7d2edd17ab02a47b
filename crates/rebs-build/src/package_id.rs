//! Persistent package path → ID map.
//!
//! IDs name per-package scratch directories, so they must be stable across
//! invocations. The map is persisted inside the current scratch tree as two
//! lines per entry (path, then ID). On load, entries whose path no longer
//! exists on disk are retired: the mapping is dropped, its scratch directory
//! is deleted, and the map is marked dirty so the retirement is flushed.

use crate::layout::{delete_folder_if_exists, ensure_directories_exist, TempLayout};
use crate::timestamps::TimestampCache;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The name of the map file inside the current scratch tree.
const PACKAGE_ID_FILE: &str = "package_ids";

#[derive(Debug, Default)]
pub struct PackageIdRegistry {
    ids_by_path: BTreeMap<PathBuf, u64>,
    next_id: u64,
    dirty: bool,
}

impl PackageIdRegistry {
    /// Reads the persisted map, keeping entries whose path still exists and
    /// retiring the rest.
    pub fn load(layout: &TempLayout, timestamps: &mut TimestampCache) -> Self {
        let mut registry = Self::default();
        let contents = match fs::read_to_string(map_path(layout)) {
            Ok(contents) => contents,
            Err(_) => return registry,
        };

        let mut lines = contents.lines();
        while let (Some(path_line), Some(id_line)) = (lines.next(), lines.next()) {
            let Ok(id) = id_line.trim().parse::<u64>() else {
                continue;
            };
            let path = PathBuf::from(path_line);
            if timestamps.exists(&path) {
                registry.ids_by_path.insert(path, id);
                ensure_directories_exist(&layout.package_dir_path(id));
            } else {
                delete_folder_if_exists(&layout.package_dir_path(id));
                registry.dirty = true;
            }
        }
        registry.next_id = registry
            .ids_by_path
            .values()
            .max()
            .map_or(0, |max_id| max_id + 1);
        registry
    }

    /// The ID of a package, allocating a fresh one (and its scratch
    /// directory) on first sight of the path.
    pub fn id_for_path(&mut self, layout: &TempLayout, path: &Path) -> u64 {
        if let Some(id) = self.ids_by_path.get(path) {
            return *id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.ids_by_path.insert(path.to_path_buf(), id);
        self.dirty = true;
        ensure_directories_exist(&layout.package_dir_path(id));
        id
    }

    /// Rewrites the persisted map if anything changed this invocation.
    pub fn flush(&mut self, layout: &TempLayout) {
        if !self.dirty {
            return;
        }

        let mut contents = String::new();
        for (path, id) in &self.ids_by_path {
            contents.push_str(&format!("{}\n{}\n", path.display(), id));
        }

        let path = map_path(layout);
        match fs::write(&path, contents) {
            Ok(()) => self.dirty = false,
            Err(_) => eprintln!(
                "Cannot write to {}. Output cannot be cached.",
                path.display()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.ids_by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids_by_path.is_empty()
    }
}

fn map_path(layout: &TempLayout) -> PathBuf {
    layout.current().join(PACKAGE_ID_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::OptLevel;
    use tempfile::TempDir;

    fn layout(temp: &TempDir) -> TempLayout {
        TempLayout::new(OptLevel::Fast, temp.path(), true)
    }

    #[test]
    fn test_ids_are_sequential_from_zero() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let mut registry = PackageIdRegistry::default();

        let a = registry.id_for_path(&layout, &temp.path().join("a"));
        let b = registry.id_for_path(&layout, &temp.path().join("b"));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(registry.id_for_path(&layout, &temp.path().join("a")), 0);
    }

    #[test]
    fn test_ids_survive_flush_and_reload() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let package = temp.path().join("pkg");
        std::fs::create_dir(&package).unwrap();

        let mut registry = PackageIdRegistry::default();
        let id = registry.id_for_path(&layout, &package);
        registry.flush(&layout);

        let mut timestamps = TimestampCache::new();
        let mut reloaded = PackageIdRegistry::load(&layout, &mut timestamps);
        assert_eq!(reloaded.id_for_path(&layout, &package), id);
    }

    #[test]
    fn test_vanished_paths_retire_and_free_their_scratch() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let doomed = temp.path().join("doomed");
        let kept = temp.path().join("kept");
        std::fs::create_dir(&doomed).unwrap();
        std::fs::create_dir(&kept).unwrap();

        let mut registry = PackageIdRegistry::default();
        let doomed_id = registry.id_for_path(&layout, &doomed);
        registry.id_for_path(&layout, &kept);
        std::fs::write(layout.package_dir(doomed_id).join("object"), "x").unwrap();
        registry.flush(&layout);

        std::fs::remove_dir_all(&doomed).unwrap();

        let mut timestamps = TimestampCache::new();
        let mut reloaded = PackageIdRegistry::load(&layout, &mut timestamps);
        assert_eq!(reloaded.len(), 1);
        assert!(!layout.package_dir_path(doomed_id).exists());

        // A re-created path gets a fresh ID past the surviving maximum.
        std::fs::create_dir(&doomed).unwrap();
        let fresh = reloaded.id_for_path(&layout, &doomed);
        assert_ne!(fresh, doomed_id);
        assert_eq!(fresh, 2);

        // The retirement itself is flushed back.
        reloaded.flush(&layout);
        let contents = std::fs::read_to_string(layout.current().join("package_ids")).unwrap();
        assert_eq!(contents.matches(&doomed.display().to_string()).count(), 1);
    }

    #[test]
    fn test_clean_reload_is_not_dirty() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let package = temp.path().join("pkg");
        std::fs::create_dir(&package).unwrap();

        let mut registry = PackageIdRegistry::default();
        registry.id_for_path(&layout, &package);
        registry.flush(&layout);
        let written = std::fs::read_to_string(layout.current().join("package_ids")).unwrap();

        let mut timestamps = TimestampCache::new();
        let mut reloaded = PackageIdRegistry::load(&layout, &mut timestamps);
        reloaded.flush(&layout);
        let after = std::fs::read_to_string(layout.current().join("package_ids")).unwrap();
        assert_eq!(written, after);
    }
}
