// src/install/clean.rs

//! Destructive cleanup: uninstalling from a tree and removing build output
//!
//! Every recursive delete of a real directory first checks it for markers
//! that only exist in source checkouts. Finding one aborts with
//! [`Error::UnsafeDirectory`] and nothing is removed.

use crate::error::{Error, Result};
use crate::path::PackageIdentity;
use crate::tree::SitLocation;
use crate::tree::proxy::remove_path;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Markers that must never appear in a build output directory
pub const BUILD_DIR_MARKERS: [&str; 5] = ["CMakeLists.txt", "packageVar.cmake", "pkgInfo.toml", "src", "build"];

/// Markers that must never appear in an installed package directory
pub const INSTALL_DIR_MARKERS: [&str; 3] = [".git", ".svn", "CMakeLists.txt"];

/// Markers identifying the top-level directory of a source package
const TOP_LEVEL_MARKERS: [&str; 3] = ["pkgInfo.toml", "CMakeLists.txt", "install"];

/// Refuse to clean `dir` if it contains any of `markers`
pub fn ensure_safe_to_clean(dir: &Path, markers: &[&str]) -> Result<()> {
    for marker in markers {
        if fs::symlink_metadata(dir.join(marker)).is_ok() {
            return Err(Error::UnsafeDirectory {
                path: dir.to_path_buf(),
                marker: marker.to_string(),
            });
        }
    }
    Ok(())
}

/// Check that `dir` looks like the top of a source package
pub fn require_top_level_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("{} is not a directory", dir.display())));
    }
    if TOP_LEVEL_MARKERS.iter().any(|m| dir.join(m).exists()) {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "{} is not the top-level directory of a package (none of {} found)",
            dir.display(),
            TOP_LEVEL_MARKERS.join(", ")
        )))
    }
}

/// Remove `build/<platform>` for every platform, then `build` if empty
pub fn distclean_build_dirs(source_dir: &Path, platforms: &[String], dry_run: bool) -> Result<Vec<PathBuf>> {
    let build = source_dir.join("build");
    let mut removed = Vec::new();

    for platform in platforms {
        let dir = build.join(platform);
        if !dir.is_dir() {
            continue;
        }
        ensure_safe_to_clean(&dir, &BUILD_DIR_MARKERS)?;
        info!("rm -rf {}", dir.display());
        if !dry_run {
            fs::remove_dir_all(&dir)?;
        }
        removed.push(dir);
    }

    if !dry_run && build.is_dir() && fs::read_dir(&build)?.next().is_none() {
        fs::remove_dir(&build)?;
        removed.push(build);
    }
    Ok(removed)
}

/// Remove `identity` from the proxy and, with `include_root`, the root
///
/// Both the current-version entry and the patchlevel directory (if the
/// identity has one) are removed. Returns what was, or with `dry_run`
/// would be, removed.
pub fn uninstall(
    identity: &PackageIdentity,
    location: &SitLocation,
    include_root: bool,
    dry_run: bool,
) -> Result<Vec<PathBuf>> {
    let mut trees: Vec<&Path> = Vec::new();
    if let Some(proxy) = &location.proxy_path {
        trees.push(proxy);
    }
    if include_root {
        trees.push(&location.root_path);
    }

    let mut relative = vec![identity.canonical_path()];
    if identity.patchlevel.is_some() {
        relative.push(identity.install_path());
    }

    // check everything before deleting anything
    let mut targets = Vec::new();
    for tree in &trees {
        for rel in &relative {
            let path = tree.join(rel);
            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    ensure_safe_to_clean(&path, &INSTALL_DIR_MARKERS)?;
                    targets.push(path);
                }
                Ok(_) => targets.push(path),
                Err(_) => debug!("{:?} not installed", path),
            }
        }
    }

    for path in &targets {
        info!("Uninstalling {}", path.display());
        if !dry_run {
            remove_path(path)?;
        }
    }
    Ok(targets)
}
