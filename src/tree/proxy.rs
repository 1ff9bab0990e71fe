// src/tree/proxy.rs

//! Creation and maintenance of proxy trees
//!
//! A proxy mirrors its root with one symlink per package version, so users
//! can install a package locally (a real directory replacing the symlink)
//! without touching the root. Over time the root gains new packages and
//! patchlevels; [`update_proxy`] brings the proxy back in line.

use super::{PARENT_LINK, active_patchlevel, follow_chain, is_proxy_dir, list_packages, read_parent_link};
use crate::error::{Error, Result};
use crate::install::clean::{INSTALL_DIR_MARKERS, ensure_safe_to_clean};
use crate::path::parse_canonical_path;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

static VERSION_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+").expect("valid regex"));

/// Create a proxy of `root` at `proxy`
///
/// Every package version of the root is linked into the proxy before the
/// `parentTree` marker is written, so a half-created proxy is never
/// mistaken for a usable one. Returns the number of linked packages.
#[cfg(unix)]
pub fn create_proxy(root: &Path, proxy: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!("root tree {}", root.display())));
    }
    if proxy.symlink_metadata().is_ok() {
        return Err(Error::InvalidPath(format!(
            "{}: proxy directory already exists",
            proxy.display()
        )));
    }
    if is_proxy_dir(root) {
        return Err(Error::InvalidPath(format!(
            "{} is itself a proxy, refusing to stack a new proxy on it",
            root.display()
        )));
    }
    if same_directory(root, proxy) {
        return Err(Error::InvalidPath(format!(
            "root and proxy are the same directory: {}",
            root.display()
        )));
    }

    info!("Creating proxy {:?} for {:?}", proxy, root);
    fs::create_dir_all(proxy)?;

    let packages = list_packages(root);
    for package in &packages {
        link_package(root, proxy, package)?;
    }

    std::os::unix::fs::symlink(root, proxy.join(PARENT_LINK))?;
    info!("Linked {} package(s) into proxy", packages.len());
    Ok(packages.len())
}

/// Which maintenance steps [`update_proxy`] performs
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub remove_broken_links: bool,
    pub remove_empty_categories: bool,
    pub link_new_packages: bool,
    /// Re-link proxy version links that lag behind the root's patchlevel
    pub relink_outdated: bool,
    /// Delete packages installed locally into the proxy
    pub remove_proxy_installations: bool,
    /// Root the `parentTree` link must point to; re-pointed when different
    pub expected_root: Option<PathBuf>,
    pub dry_run: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            remove_broken_links: true,
            remove_empty_categories: true,
            link_new_packages: true,
            relink_outdated: true,
            remove_proxy_installations: false,
            expected_root: None,
            dry_run: false,
        }
    }
}

/// What [`update_proxy`] changed (or would change, in dry-run mode)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub parent_relinked: bool,
    pub removed_broken: Vec<PathBuf>,
    pub removed_empty: Vec<PathBuf>,
    pub linked: Vec<String>,
    pub relinked: Vec<String>,
    pub removed_installations: Vec<String>,
}

impl UpdateReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Bring a proxy in line with its root
#[cfg(unix)]
pub fn update_proxy(proxy: &Path, options: &UpdateOptions) -> Result<UpdateReport> {
    let mut report = UpdateReport::default();

    if let Some(expected) = &options.expected_root {
        check_parent_link(proxy, expected, options.dry_run, &mut report)?;
    }

    if !is_proxy_dir(proxy) {
        return Err(Error::NotProxyTree(proxy.to_path_buf()));
    }
    let root = follow_chain(proxy);
    debug!("Updating proxy {:?} (root {:?})", proxy, root);

    if options.remove_broken_links {
        remove_broken_links(proxy, options.dry_run, &mut report)?;
    }
    if options.remove_proxy_installations {
        remove_installations(proxy, options.dry_run, &mut report)?;
    }
    if options.remove_empty_categories {
        remove_empty_dirs(proxy, options.dry_run, &mut report)?;
    }
    if options.link_new_packages {
        link_new_packages(&root, proxy, options.dry_run, &mut report)?;
    }
    if options.relink_outdated {
        relink_outdated(&root, proxy, options.dry_run, &mut report)?;
    }

    Ok(report)
}

/// Packages installed locally into the proxy (real directories, not links)
pub fn find_proxy_installations(proxy: &Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(proxy).min_depth(1).follow_links(false).into_iter();

    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() >= 3 && VERSION_DIR_RE.is_match(&name) {
            if let Ok(relative) = entry.path().strip_prefix(proxy) {
                found.push(relative.to_string_lossy().into_owned());
            }
            walker.skip_current_dir();
        }
    }

    found.sort();
    found
}

#[cfg(unix)]
fn check_parent_link(proxy: &Path, expected: &Path, dry_run: bool, report: &mut UpdateReport) -> Result<()> {
    let current = read_parent_link(proxy);
    if current.as_deref().is_some_and(|c| same_directory(c, expected)) {
        return Ok(());
    }

    warn!("{}/{} does not point to {:?}, fixing", proxy.display(), PARENT_LINK, expected);
    report.parent_relinked = true;
    if !dry_run {
        let link = proxy.join(PARENT_LINK);
        if link.symlink_metadata().is_ok() {
            remove_path(&link)?;
        }
        std::os::unix::fs::symlink(expected, &link)?;
    }
    Ok(())
}

fn remove_broken_links(proxy: &Path, dry_run: bool, report: &mut UpdateReport) -> Result<()> {
    for entry in WalkDir::new(proxy).min_depth(1).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_symlink() {
            continue;
        }
        if entry.depth() == 1 && entry.file_name() == PARENT_LINK {
            continue;
        }
        if fs::metadata(entry.path()).is_err() {
            info!("Removing broken link {:?}", entry.path());
            if !dry_run {
                fs::remove_file(entry.path())?;
            }
            report.removed_broken.push(entry.path().to_path_buf());
        }
    }
    Ok(())
}

fn remove_empty_dirs(proxy: &Path, dry_run: bool, report: &mut UpdateReport) -> Result<()> {
    for entry in WalkDir::new(proxy).min_depth(1).follow_links(false).contents_first(true) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let mut children = fs::read_dir(entry.path())?;
        if children.next().is_none() {
            debug!("Removing empty directory {:?}", entry.path());
            if !dry_run {
                fs::remove_dir(entry.path())?;
            }
            report.removed_empty.push(entry.path().to_path_buf());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn link_new_packages(root: &Path, proxy: &Path, dry_run: bool, report: &mut UpdateReport) -> Result<()> {
    for package in list_packages(root) {
        let target = proxy.join(&package);
        if target.symlink_metadata().is_ok() || covered_by_link(proxy, &package) {
            continue;
        }
        info!("Linking new package {}", package);
        if !dry_run {
            link_package(root, proxy, &package)?;
        }
        report.linked.push(package);
    }
    Ok(())
}

#[cfg(unix)]
fn relink_outdated(root: &Path, proxy: &Path, dry_run: bool, report: &mut UpdateReport) -> Result<()> {
    for package in list_packages(root) {
        let Ok(identity) = parse_canonical_path(&package) else { continue };
        if identity.version_raw != identity.version {
            continue;
        }

        let proxy_entry = proxy.join(&package);
        let is_link = proxy_entry
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            continue;
        }

        let Some(root_level) = active_patchlevel(root, &identity) else { continue };
        let proxy_level = active_patchlevel(proxy, &identity);
        if proxy_level.is_none_or(|level| level < root_level) {
            info!(
                "Proxy link {} is at patchlevel {:?}, root has {}",
                package, proxy_level, root_level
            );
            if !dry_run {
                fs::remove_file(&proxy_entry)?;
                std::os::unix::fs::symlink(root.join(&package), &proxy_entry)?;
            }
            report.relinked.push(package);
        }
    }
    Ok(())
}

fn remove_installations(proxy: &Path, dry_run: bool, report: &mut UpdateReport) -> Result<()> {
    let packages = find_proxy_installations(proxy);
    // all or nothing: one checkout among them stops the whole removal
    for package in &packages {
        ensure_safe_to_clean(&proxy.join(package), &INSTALL_DIR_MARKERS)?;
    }

    for package in packages {
        info!("Removing proxy installation {}", package);
        if !dry_run {
            fs::remove_dir_all(proxy.join(&package))?;
        }
        report.removed_installations.push(package);
    }
    Ok(())
}

#[cfg(unix)]
pub(super) fn link_package(root: &Path, proxy: &Path, package: &str) -> Result<()> {
    let link = proxy.join(package);
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(root.join(package), &link)?;
    Ok(())
}

/// True if some ancestor of `package` inside the proxy is already a symlink
fn covered_by_link(proxy: &Path, package: &str) -> bool {
    let mut current = proxy.to_path_buf();
    for component in Path::new(package).components() {
        current.push(component);
        if current
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            return true;
        }
    }
    false
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Remove a file, symlink or directory tree
pub(crate) fn remove_path(path: &Path) -> Result<()> {
    let metadata = path.symlink_metadata()?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
