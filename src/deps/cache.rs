// src/deps/cache.rs

//! Per-operation memoization for the dependency resolver

use super::{DependencyNode, PackageUrl, ResolveOptions};
use std::collections::{HashMap, HashSet};

/// A finished sub-tree and every package appearing in it
#[derive(Debug)]
struct Expanded {
    children: Vec<DependencyNode>,
    members: HashSet<PackageUrl>,
}

/// Memoized dependency lookups
///
/// Owned by one top-level operation and passed by `&mut` into every
/// resolver call. Nothing here is shared between threads or runs.
#[derive(Debug, Default)]
pub struct DependencyCache {
    direct: HashMap<(PackageUrl, bool), Vec<PackageUrl>>,
    installed: HashMap<PackageUrl, bool>,
    expanded: HashMap<(PackageUrl, ResolveOptions), Expanded>,
    in_progress: HashSet<PackageUrl>,
    reads: usize,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of metadata reads and existence checks performed so far
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Pre-load the direct list of a package that is not in the tree yet,
    /// e.g. a source package about to be installed. The package counts as
    /// installed from then on.
    pub fn seed(&mut self, url: &PackageUrl, build: bool, depends: Vec<PackageUrl>) {
        self.direct.insert((url.clone(), build), depends);
        self.installed.insert(url.clone(), true);
    }

    pub(super) fn count_read(&mut self) {
        self.reads += 1;
    }

    pub(super) fn direct(&self, url: &PackageUrl, build: bool) -> Option<&[PackageUrl]> {
        self.direct
            .get(&(url.clone(), build))
            .map(Vec::as_slice)
    }

    pub(super) fn set_direct(&mut self, url: &PackageUrl, build: bool, list: Vec<PackageUrl>) {
        self.direct.insert((url.clone(), build), list);
    }

    pub(super) fn installed(&self, url: &PackageUrl) -> Option<bool> {
        self.installed.get(url).copied()
    }

    pub(super) fn set_installed(&mut self, url: &PackageUrl, installed: bool) {
        self.installed.insert(url.clone(), installed);
    }

    /// A stored sub-tree, unless one of its packages is being expanded
    /// right now; the cycle would then be cut at a different place.
    pub(super) fn expanded(
        &self,
        url: &PackageUrl,
        options: &ResolveOptions,
    ) -> Option<&[DependencyNode]> {
        let hit = self.expanded.get(&(url.clone(), *options))?;
        if hit.members.iter().any(|member| self.in_progress.contains(member)) {
            return None;
        }
        Some(&hit.children)
    }

    /// Store a sub-tree; only valid for sub-trees without cycle cuts to
    /// packages outside of them.
    pub(super) fn set_expanded(
        &mut self,
        url: &PackageUrl,
        options: &ResolveOptions,
        children: Vec<DependencyNode>,
    ) {
        let mut nodes = Vec::new();
        for child in &children {
            child.collect(&mut nodes);
        }
        let members = nodes.into_iter().map(|n| n.url.clone()).collect();
        self.expanded
            .insert((url.clone(), *options), Expanded { children, members });
    }

    pub(super) fn begin(&mut self, url: &PackageUrl) {
        self.in_progress.insert(url.clone());
    }

    pub(super) fn end(&mut self, url: &PackageUrl) {
        self.in_progress.remove(url);
    }

    pub(super) fn in_progress(&self, url: &PackageUrl) -> bool {
        self.in_progress.contains(url)
    }
}
