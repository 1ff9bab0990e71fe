// src/tree/bootstrap.rs

//! Minimal trees holding a chosen set of packages
//!
//! A bootstrapped tree is a new root whose package entries are symlinks
//! into an existing tree. Only the requested packages and their runtime
//! closure are linked. Current-version links are recreated inside the new
//! tree so patchlevel lookups there give the same answer as in the source.

use super::proxy::link_package;
use crate::deps::{DependencyCache, DependencyResolver, PackageUrl, ResolveOptions, reduce_list};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, info};

/// Create a tree at `target` holding `packages` and everything they need
///
/// Dependencies are resolved against the resolver's tree before anything is
/// written, so a missing package leaves no half-built tree behind. System
/// packages are not linked. Returns the linked tree-relative paths.
#[cfg(unix)]
pub fn bootstrap_tree(
    resolver: &DependencyResolver<'_>,
    target: &Path,
    packages: &[PackageUrl],
    cache: &mut DependencyCache,
) -> Result<Vec<String>> {
    let source = resolver.tree();
    if !source.is_dir() {
        return Err(Error::NotFound(format!("source tree {}", source.display())));
    }
    if target.symlink_metadata().is_ok() {
        return Err(Error::InvalidPath(format!("{}: directory exists", target.display())));
    }

    let options = ResolveOptions {
        recursive: true,
        ..Default::default()
    };

    let mut selected = Vec::new();
    for package in packages {
        if package.is_system() {
            debug!("{}: system package, not linked", package);
            continue;
        }
        if !resolver.is_installed(package, cache) {
            return Err(Error::NotFound(format!("{} in {}", package, source.display())));
        }
        selected.push(package.clone());
        let tree = resolver.resolve(package, &options, cache)?;
        selected.extend(tree.unique());
    }
    let selected = reduce_list(selected);

    info!("Bootstrapping tree in {:?} with {} package(s)", target, selected.len());
    fs::create_dir_all(target)?;

    let mut linked = Vec::new();
    for url in &selected {
        if target.join(&url.path).symlink_metadata().is_ok() {
            continue;
        }
        link_entry(source, target, &url.path, &mut linked)?;
    }

    linked.sort();
    Ok(linked)
}

/// Link one package entry, keeping a relative version link as a link
#[cfg(unix)]
fn link_entry(source: &Path, target: &Path, package: &str, linked: &mut Vec<String>) -> Result<()> {
    let entry = source.join(package);
    let sibling = fs::read_link(&entry)
        .ok()
        .filter(|dest| is_sibling_name(dest));

    let (Some(dest), Some(parent)) = (sibling, Path::new(package).parent()) else {
        link_package(source, target, package)?;
        linked.push(package.to_string());
        return Ok(());
    };

    let resolved = parent.join(&dest).to_string_lossy().into_owned();
    if target.join(&resolved).symlink_metadata().is_err() {
        link_package(source, target, &resolved)?;
        linked.push(resolved);
    }
    std::os::unix::fs::symlink(&dest, target.join(package))?;
    linked.push(package.to_string());
    Ok(())
}

/// A bare entry name, as in `1.0 -> 1.0.3`
fn is_sibling_name(dest: &Path) -> bool {
    let mut components = dest.components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}
