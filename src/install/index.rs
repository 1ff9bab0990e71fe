// src/install/index.rs

//! The install index: what gets copied where

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// One scheduled file operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Relative to the package's source directory, or absolute
    pub source: PathBuf,
    /// Relative to the tree (or scratch directory) being written
    pub destination: PathBuf,
}

/// Ordered `(source, destination)` pairs with unique destinations
///
/// Scheduling a destination a second time replaces its source but keeps
/// the original position. Temporary objects created while scanning (e.g.
/// staged symlinks) are tracked so they can be removed at the end of a run.
#[derive(Debug, Default)]
pub struct InstallIndex {
    entries: Vec<IndexEntry>,
    positions: HashMap<PathBuf, usize>,
    temp_objects: Vec<PathBuf>,
}

impl InstallIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `source -> destination`; returns `false` for a replacement
    pub fn push(&mut self, source: impl Into<PathBuf>, destination: impl AsRef<Path>) -> bool {
        let source = source.into();
        let destination = clean_relative(destination.as_ref());

        if let Some(&pos) = self.positions.get(&destination) {
            debug!(
                "{:?} already scheduled from {:?}, now from {:?}",
                destination, self.entries[pos].source, source
            );
            self.entries[pos].source = source;
            return false;
        }

        self.positions.insert(destination.clone(), self.entries.len());
        self.entries.push(IndexEntry {
            source,
            destination,
        });
        true
    }

    pub fn get(&self, destination: &Path) -> Option<&IndexEntry> {
        self.positions
            .get(&clean_relative(destination))
            .map(|&pos| &self.entries[pos])
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose source starts with one of `prefixes`
    pub fn exclude(&mut self, prefixes: &[String]) -> Vec<IndexEntry> {
        if prefixes.is_empty() {
            return Vec::new();
        }

        let (removed, kept): (Vec<IndexEntry>, Vec<IndexEntry>) =
            self.entries.drain(..).partition(|entry| {
                let source = entry.source.to_string_lossy();
                prefixes.iter().any(|prefix| source.starts_with(prefix.as_str()))
            });

        for entry in &removed {
            info!("Skipping excluded {}", entry.source.display());
        }

        self.entries = kept;
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.destination.clone(), pos))
            .collect();
        removed
    }

    pub fn add_temp_object(&mut self, path: PathBuf) {
        self.temp_objects.push(path);
    }

    pub fn temp_objects(&self) -> &[PathBuf] {
        &self.temp_objects
    }

    /// Remove all temporary objects, ignoring ones already gone
    pub fn remove_temp_objects(&mut self) -> usize {
        let mut removed = 0;
        for path in self.temp_objects.drain(..) {
            debug!("Removing {:?}", path);
            let result = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(_) => continue,
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => debug!("Failed to remove {:?}: {}", path, e),
            }
        }
        removed
    }
}

/// Normal components of `path`; `.` and leading `/` are dropped
pub(crate) fn clean_relative(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
