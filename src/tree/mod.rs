// src/tree/mod.rs

//! Locating the active Software Installation Tree
//!
//! A tree is either a *root* (a real directory holding package installs) or
//! a *proxy*: a per-user overlay whose `parentTree` entry is a symlink to the
//! tree it shadows. Proxies may be stacked; the chain always ends at a root.
//!
//! Resolution order for the active tree:
//!
//! 1. an explicit override (`SIT` environment variable or `tree` config key)
//! 2. the user's proxy for the current epoch, if it exists
//! 3. the root tree for the current epoch

pub mod bootstrap;
pub mod proxy;

use crate::config::{Config, Environment};
use crate::path::PackageIdentity;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the marker entry that turns a directory into a proxy
pub const PARENT_LINK: &str = "parentTree";

static PACKAGE_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)(.*)$").expect("valid regex"));

static PATCHLEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.(\d+)$").expect("valid regex"));

/// Where packages are read from and written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitLocation {
    /// The non-proxy tree at the end of the chain
    pub root_path: PathBuf,
    /// The proxy itself, when the active tree is a proxy
    pub proxy_path: Option<PathBuf>,
    /// Target of the proxy's `parentTree` link (one hop)
    pub parent_path: Option<PathBuf>,
}

impl SitLocation {
    /// Inspect `path` and classify it as root or proxy
    pub fn probe(path: &Path) -> Self {
        match read_parent_link(path) {
            Some(parent) => {
                let root_path = follow_chain(path);
                debug!("{:?} is a proxy of {:?} (root {:?})", path, parent, root_path);
                Self {
                    root_path,
                    proxy_path: Some(path.to_path_buf()),
                    parent_path: Some(parent),
                }
            }
            None => Self::root(path),
        }
    }

    /// A location that is known to be a root
    pub fn root(path: &Path) -> Self {
        Self {
            root_path: path.to_path_buf(),
            proxy_path: None,
            parent_path: None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy_path.is_some()
    }

    /// The tree users see: the proxy if there is one, else the root
    pub fn active_path(&self) -> &Path {
        self.proxy_path.as_deref().unwrap_or(&self.root_path)
    }
}

/// Finds the active tree from configuration and environment
#[derive(Debug, Clone)]
pub struct TreeResolver {
    override_path: Option<PathBuf>,
    proxy_base: Option<PathBuf>,
    root_base: PathBuf,
    epoch: String,
}

impl TreeResolver {
    pub fn new(root_base: impl Into<PathBuf>, proxy_base: Option<PathBuf>, epoch: &str) -> Self {
        Self {
            override_path: None,
            proxy_base,
            root_base: root_base.into(),
            epoch: epoch.to_string(),
        }
    }

    pub fn with_override(mut self, path: Option<PathBuf>) -> Self {
        self.override_path = path;
        self
    }

    pub fn from_config(config: &Config, env: &Environment) -> Self {
        let epoch = env.sit_version.as_deref().unwrap_or(&config.epoch);
        Self::new(config.root_base.clone(), config.proxy_base(), epoch)
            .with_override(env.sit.clone().or_else(|| config.tree.clone()))
    }

    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Root tree for the configured epoch
    pub fn default_root(&self) -> PathBuf {
        self.root_base.join(&self.epoch)
    }

    /// Proxy tree for the configured epoch, whether or not it exists
    pub fn default_proxy(&self) -> Option<PathBuf> {
        self.proxy_base.as_ref().map(|base| base.join(&self.epoch))
    }

    /// Path of the active tree, without classifying it
    pub fn active_path(&self) -> PathBuf {
        if let Some(path) = &self.override_path {
            return path.clone();
        }
        if let Some(proxy) = self.default_proxy()
            && proxy.is_dir()
        {
            return proxy;
        }
        self.default_root()
    }

    pub fn resolve_active_tree(&self) -> SitLocation {
        SitLocation::probe(&self.active_path())
    }
}

/// Target of `<dir>/parentTree`, made absolute
///
/// Returns `None` when the entry is missing, not a symlink, or dangling;
/// all of these mean "this directory is a root".
pub fn read_parent_link(dir: &Path) -> Option<PathBuf> {
    let link = dir.join(PARENT_LINK);
    let target = match fs::read_link(&link) {
        Ok(target) => target,
        Err(_) => return None,
    };
    let target = if target.is_absolute() {
        target
    } else {
        dir.join(target)
    };
    if target.is_dir() {
        Some(target)
    } else {
        debug!("{:?} points to missing {:?}, treating as root", link, target);
        None
    }
}

pub fn is_proxy_dir(dir: &Path) -> bool {
    read_parent_link(dir).is_some()
}

/// One hop up the chain; a root is its own parent
pub fn resolve_parent(location: &SitLocation) -> PathBuf {
    location
        .parent_path
        .clone()
        .unwrap_or_else(|| location.root_path.clone())
}

/// Follow the chain from the active tree to its root
pub fn resolve_root(location: &SitLocation) -> PathBuf {
    if !location.is_proxy() {
        return location.root_path.clone();
    }
    follow_chain(location.active_path())
}

fn follow_chain(start: &Path) -> PathBuf {
    let mut visited = HashSet::new();
    let mut current = start.to_path_buf();
    visited.insert(identity_of(&current));

    while let Some(next) = read_parent_link(&current) {
        if !visited.insert(identity_of(&next)) {
            warn!("Proxy chain loops at {:?}, stopping at {:?}", next, current);
            break;
        }
        current = next;
    }
    current
}

fn identity_of(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// All package version entries of a tree, as tree-relative paths
///
/// Both real directories and symlinks count, so `Libraries/Foo/1.0` (the
/// current-version link) and `Libraries/Foo/1.0.3` are both listed.
pub fn list_packages(tree: &Path) -> Vec<String> {
    let mut packages = Vec::new();
    let mut walker = WalkDir::new(tree).min_depth(1).follow_links(false).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry below {:?}: {}", tree, e);
                continue;
            }
        };

        if entry.depth() == 1 && entry.file_name() == PARENT_LINK {
            continue;
        }

        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_symlink() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if entry.depth() >= 3 && PACKAGE_DIR_RE.is_match(&name) {
            if let Ok(relative) = entry.path().strip_prefix(tree) {
                packages.push(relative.to_string_lossy().into_owned());
            }
            if file_type.is_dir() {
                walker.skip_current_dir();
            }
        }
    }

    packages.sort();
    packages
}

/// Patchlevel the current-version link of `identity` points at
pub fn active_patchlevel(tree: &Path, identity: &PackageIdentity) -> Option<u32> {
    let resolved = fs::canonicalize(tree.join(identity.canonical_path())).ok()?;
    let name = resolved.file_name()?.to_string_lossy().into_owned();
    PATCHLEVEL_RE
        .captures(&name)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::path::parse_canonical_path;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_root_location() {
        let temp_dir = TempDir::new().unwrap();
        let location = SitLocation::probe(temp_dir.path());
        assert!(!location.is_proxy());
        assert_eq!(location.active_path(), temp_dir.path());
        assert_eq!(resolve_root(&location), temp_dir.path());
        assert_eq!(resolve_parent(&location), temp_dir.path());
    }

    #[test]
    fn test_proxy_chain() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let middle = temp_dir.path().join("middle");
        let proxy = temp_dir.path().join("proxy");
        for dir in [&root, &middle, &proxy] {
            fs::create_dir_all(dir).unwrap();
        }
        symlink(&root, middle.join(PARENT_LINK)).unwrap();
        symlink(&middle, proxy.join(PARENT_LINK)).unwrap();

        let location = SitLocation::probe(&proxy);
        assert!(location.is_proxy());
        assert_eq!(resolve_parent(&location), middle);
        assert_eq!(resolve_root(&location), root);
        assert_eq!(location.root_path, root);
    }

    #[test]
    fn test_relative_parent_link() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let proxy = temp_dir.path().join("proxy");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&proxy).unwrap();
        symlink("../root", proxy.join(PARENT_LINK)).unwrap();

        let location = SitLocation::probe(&proxy);
        assert!(location.is_proxy());
        assert_eq!(fs::canonicalize(resolve_root(&location)).unwrap(), fs::canonicalize(&root).unwrap());
    }

    #[test]
    fn test_broken_or_plain_marker_means_root() {
        let temp_dir = TempDir::new().unwrap();

        let broken = temp_dir.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        symlink(temp_dir.path().join("nowhere"), broken.join(PARENT_LINK)).unwrap();
        assert!(!SitLocation::probe(&broken).is_proxy());

        let plain = temp_dir.path().join("plain");
        fs::create_dir_all(plain.join(PARENT_LINK)).unwrap();
        assert!(!SitLocation::probe(&plain).is_proxy());
    }

    #[test]
    fn test_cyclic_chain_terminates() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        symlink(&b, a.join(PARENT_LINK)).unwrap();
        symlink(&a, b.join(PARENT_LINK)).unwrap();

        let location = SitLocation::probe(&a);
        assert_eq!(resolve_root(&location), b);
    }

    #[test]
    fn test_resolver_order() {
        let temp_dir = TempDir::new().unwrap();
        let root_base = temp_dir.path().join("sit");
        let proxy_base = temp_dir.path().join("home/.HRI/sit");
        fs::create_dir_all(root_base.join("latest")).unwrap();

        let resolver = TreeResolver::new(&root_base, Some(proxy_base.clone()), "latest");
        assert_eq!(resolver.resolve_active_tree().active_path(), root_base.join("latest"));

        fs::create_dir_all(proxy_base.join("latest")).unwrap();
        symlink(root_base.join("latest"), proxy_base.join("latest").join(PARENT_LINK)).unwrap();
        let location = resolver.resolve_active_tree();
        assert!(location.is_proxy());
        assert_eq!(location.active_path(), proxy_base.join("latest"));

        let explicit = temp_dir.path().join("explicit");
        let resolver = resolver.with_override(Some(explicit.clone()));
        assert_eq!(resolver.active_path(), explicit);
    }

    #[test]
    fn test_list_packages_and_active_patchlevel() {
        let temp_dir = TempDir::new().unwrap();
        let tree = temp_dir.path();
        fs::create_dir_all(tree.join("Libraries/Foo/1.0.0")).unwrap();
        fs::create_dir_all(tree.join("Libraries/Foo/1.0.1/doc/2.3")).unwrap();
        symlink("1.0.1", tree.join("Libraries/Foo/1.0")).unwrap();
        fs::create_dir_all(tree.join("DevelopmentTools/Compilers/GCC/4.8")).unwrap();
        fs::create_dir_all(tree.join("Temporary/logs")).unwrap();
        symlink(tree, tree.join(PARENT_LINK)).unwrap();

        let packages = list_packages(tree);
        assert_eq!(
            packages,
            vec![
                "DevelopmentTools/Compilers/GCC/4.8".to_string(),
                "Libraries/Foo/1.0".to_string(),
                "Libraries/Foo/1.0.0".to_string(),
                "Libraries/Foo/1.0.1".to_string(),
            ]
        );

        let id = parse_canonical_path("Libraries/Foo/1.0").unwrap();
        assert_eq!(active_patchlevel(tree, &id), Some(1));
        let gcc = parse_canonical_path("DevelopmentTools/Compilers/GCC/4.8").unwrap();
        assert_eq!(active_patchlevel(tree, &gcc), None);
    }
}
