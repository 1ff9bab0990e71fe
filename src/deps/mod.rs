// src/deps/mod.rs

//! Dependency resolution
//!
//! Dependencies are package URLs read from each package's `pkgInfo.toml`:
//!
//! - `sit://Libraries/Foo/1.0` (or just `Libraries/Foo/1.0`): a package in
//!   the active tree
//! - `deb://libxml2`: a system package, checked through a
//!   [`SystemPackageProbe`]
//!
//! Resolution produces a [`DependencyTree`]. All filesystem reads go through
//! a [`DependencyCache`] that the caller owns for the duration of one
//! top-level operation, so repeated lookups in large graphs stay cheap and a
//! package currently being expanded is never entered twice.

mod cache;
mod conflict;
mod system;

pub use cache::DependencyCache;
pub use conflict::{check_batch, detect_conflicts, ConflictReport};
pub use system::{DpkgProbe, NoSystemPackages, SystemPackageProbe};

use crate::error::{Error, Result};
use crate::metadata::PkgInfo;
use crate::path::{self, PackageIdentity};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Categories whose packages are expected to have no dependents
pub const ORPHAN_EXEMPT_CATEGORIES: [&str; 6] = [
    "Applications",
    "Modules/BBCM",
    "Modules/Index",
    "Modules/RTMaps",
    "Scripts",
    "Temporary",
];

/// Where a dependency comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    /// Package in the Software Installation Tree
    Sit,
    /// Operating system package
    Deb,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sit => "sit",
            Scheme::Deb => "deb",
        }
    }
}

/// A dependency reference such as `sit://Libraries/Foo/1.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageUrl {
    pub scheme: Scheme,
    pub path: String,
}

impl PackageUrl {
    /// Parse a URL, defaulting to `sit://` when no scheme is given
    ///
    /// ```
    /// use sitkit::deps::{PackageUrl, Scheme};
    ///
    /// let url = PackageUrl::parse("Libraries/Foo/1.0").unwrap();
    /// assert_eq!(url.scheme, Scheme::Sit);
    /// assert_eq!(url.to_string(), "sit://Libraries/Foo/1.0");
    /// assert!(PackageUrl::parse("deb://zlib1g").unwrap().is_system());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = match s.split_once("://") {
            Some(("sit", rest)) => (Scheme::Sit, rest),
            Some(("deb", rest)) => (Scheme::Deb, rest),
            Some((other, _)) => {
                return Err(Error::ParseError(format!(
                    "unsupported package URL scheme '{}' in {}",
                    other, s
                )));
            }
            None => (Scheme::Sit, s),
        };

        let path = match scheme {
            Scheme::Sit => path::strip(rest, &[]),
            Scheme::Deb => rest.to_string(),
        };
        let path = path.trim_matches('/').to_string();
        if path.is_empty() {
            return Err(Error::ParseError(format!("empty package URL: {:?}", s)));
        }

        Ok(Self { scheme, path })
    }

    pub fn sit(canonical_path: &str) -> Self {
        Self {
            scheme: Scheme::Sit,
            path: canonical_path.trim_matches('/').to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.scheme == Scheme::Deb
    }

    /// Identity of a `sit://` URL whose path is a package path
    pub fn identity(&self) -> Option<PackageIdentity> {
        match self.scheme {
            Scheme::Sit => path::parse_canonical_path(&self.path).ok(),
            Scheme::Deb => None,
        }
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.path)
    }
}

impl FromStr for PackageUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Knobs for [`DependencyResolver::resolve`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResolveOptions {
    /// Walk the whole closure instead of the direct list
    pub recursive: bool,
    /// Keep going when a dependency is not installed
    pub ignore_errors: bool,
    /// Flag missing dependencies in the result
    pub highlight_missing: bool,
    /// Keep `deb://` entries in the result
    pub include_system_packages: bool,
    /// Read `buildDepends` of the top-level package instead of `depends`
    pub build_dependencies: bool,
}

/// One dependency and, when resolved recursively, its own dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub url: PackageUrl,
    pub missing: bool,
    /// Dependency that was already being expanded higher up
    pub cyclic: bool,
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub(crate) fn new(url: PackageUrl) -> Self {
        Self {
            url,
            missing: false,
            cyclic: false,
            children: Vec::new(),
        }
    }

    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a DependencyNode>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// Result of one resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTree {
    pub root: PackageUrl,
    pub children: Vec<DependencyNode>,
}

impl DependencyTree {
    fn nodes(&self) -> Vec<&DependencyNode> {
        let mut out = Vec::new();
        for child in &self.children {
            child.collect(&mut out);
        }
        out
    }

    /// Pre-order list of all dependencies, duplicates included
    pub fn flatten(&self) -> Vec<PackageUrl> {
        self.nodes().into_iter().map(|n| n.url.clone()).collect()
    }

    /// De-duplicated pre-order list
    pub fn unique(&self) -> Vec<PackageUrl> {
        reduce_list(self.flatten())
    }

    /// Dependencies flagged as missing
    pub fn missing(&self) -> Vec<PackageUrl> {
        reduce_list(
            self.nodes()
                .into_iter()
                .filter(|n| n.missing)
                .map(|n| n.url.clone())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl fmt::Display for DependencyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_nodes(
            f: &mut fmt::Formatter<'_>,
            nodes: &[DependencyNode],
            depth: usize,
        ) -> fmt::Result {
            for node in nodes {
                write!(f, "{}{}", "  ".repeat(depth), node.url)?;
                if node.missing {
                    write!(f, " (missing)")?;
                }
                if node.cyclic {
                    write!(f, " (cycle)")?;
                }
                writeln!(f)?;
                write_nodes(f, &node.children, depth + 1)?;
            }
            Ok(())
        }

        writeln!(f, "{}", self.root)?;
        write_nodes(f, &self.children, 1)
    }
}

/// Remove duplicates, keeping the first occurrence of each item
///
/// ```
/// use sitkit::deps::reduce_list;
///
/// assert_eq!(reduce_list(vec![1, 2, 1, 3, 2]), vec![1, 2, 3]);
/// ```
pub fn reduce_list<T: Clone + Eq + Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Resolves package URLs against one tree
pub struct DependencyResolver<'a> {
    tree: PathBuf,
    probe: &'a dyn SystemPackageProbe,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(tree: impl Into<PathBuf>, probe: &'a dyn SystemPackageProbe) -> Self {
        Self {
            tree: tree.into(),
            probe,
        }
    }

    pub fn tree(&self) -> &Path {
        &self.tree
    }

    /// Resolve the dependencies of `url`
    pub fn resolve(
        &self,
        url: &PackageUrl,
        options: &ResolveOptions,
        cache: &mut DependencyCache,
    ) -> Result<DependencyTree> {
        debug!("Resolving dependencies of {} ({:?})", url, options);

        let children = if options.build_dependencies {
            // Build dependencies apply to the top level only; their closure
            // is the runtime closure of each build dependency.
            let nested = ResolveOptions {
                build_dependencies: false,
                ..*options
            };
            let direct = self.direct_dependencies(url, true, cache);
            cache.begin(url);
            let result = self.expand_list(url, direct, &nested, cache);
            cache.end(url);
            result?.children
        } else {
            self.expand(url, options, cache)?.children
        };

        Ok(DependencyTree {
            root: url.clone(),
            children,
        })
    }

    /// Direct dependency list of `url`, read once per cache
    pub fn direct_dependencies(
        &self,
        url: &PackageUrl,
        build: bool,
        cache: &mut DependencyCache,
    ) -> Vec<PackageUrl> {
        if let Some(hit) = cache.direct(url, build) {
            return hit.to_vec();
        }

        let list = match url.scheme {
            Scheme::Deb => Vec::new(),
            Scheme::Sit => {
                cache.count_read();
                let info = PkgInfo::load_or_default(&self.tree.join(&url.path));
                let raw = if build { &info.build_depends } else { &info.depends };
                parse_urls(url, raw)
            }
        };

        cache.set_direct(url, build, list.clone());
        list
    }

    /// Whether `url` exists in the tree or on the system
    pub fn is_installed(&self, url: &PackageUrl, cache: &mut DependencyCache) -> bool {
        if let Some(hit) = cache.installed(url) {
            return hit;
        }

        cache.count_read();
        let installed = match url.scheme {
            Scheme::Sit => self.tree.join(&url.path).exists(),
            Scheme::Deb => self.probe.is_installed(&url.path),
        };
        cache.set_installed(url, installed);
        installed
    }

    /// Flat, de-duplicated closure of every package in `packages`
    pub fn closure_map(
        &self,
        packages: &[PackageUrl],
        options: &ResolveOptions,
        cache: &mut DependencyCache,
    ) -> Result<BTreeMap<PackageUrl, Vec<PackageUrl>>> {
        let mut map = BTreeMap::new();
        for package in packages {
            let tree = self.resolve(package, options, cache)?;
            map.insert(package.clone(), tree.unique());
        }
        Ok(map)
    }

    /// Installed packages that directly depend on `url`
    pub fn reverse_dependencies(
        &self,
        url: &PackageUrl,
        cache: &mut DependencyCache,
    ) -> Vec<PackageUrl> {
        let target = package_key(url);
        let mut result = Vec::new();

        for candidate in self.installed_packages() {
            let direct = self.direct_dependencies(&candidate, false, cache);
            if direct.iter().any(|dep| package_key(dep) == target) {
                result.push(candidate);
            }
        }
        result
    }

    /// Installed packages no other installed package depends on
    ///
    /// Packages below [`ORPHAN_EXEMPT_CATEGORIES`] normally have no
    /// dependents and are left out unless `all` is set.
    pub fn orphans(&self, all: bool, cache: &mut DependencyCache) -> Vec<PackageUrl> {
        let packages = self.installed_packages();

        let mut used = HashSet::new();
        for package in &packages {
            for dep in self.direct_dependencies(package, false, cache) {
                if !dep.is_system() {
                    used.insert(package_key(&dep));
                }
            }
        }

        packages
            .into_iter()
            .filter(|p| all || !is_orphan_exempt(&p.path))
            .filter(|p| !used.contains(&package_key(p)))
            .collect()
    }

    /// One URL per installed package version, patchlevel directories left out
    fn installed_packages(&self) -> Vec<PackageUrl> {
        crate::tree::list_packages(&self.tree)
            .iter()
            .map(|package| PackageUrl::sit(package))
            // patchlevel directories duplicate their current-version link
            .filter(|url| !url.identity().is_some_and(|id| id.version_raw != id.version))
            .collect()
    }

    fn expand(
        &self,
        url: &PackageUrl,
        options: &ResolveOptions,
        cache: &mut DependencyCache,
    ) -> Result<Expansion> {
        if let Some(hit) = cache.expanded(url, options) {
            return Ok(Expansion {
                children: hit.to_vec(),
                open_cuts: HashSet::new(),
            });
        }

        let direct = self.direct_dependencies(url, false, cache);
        cache.begin(url);
        let result = self.expand_list(url, direct, options, cache);
        cache.end(url);

        let mut expansion = result?;
        expansion.open_cuts.remove(url);
        if expansion.open_cuts.is_empty() {
            cache.set_expanded(url, options, expansion.children.clone());
        } else {
            debug!("{}: cut short by a cycle, not caching", url);
        }
        Ok(expansion)
    }

    fn expand_list(
        &self,
        parent: &PackageUrl,
        direct: Vec<PackageUrl>,
        options: &ResolveOptions,
        cache: &mut DependencyCache,
    ) -> Result<Expansion> {
        let mut children = Vec::with_capacity(direct.len());
        let mut open_cuts = HashSet::new();

        for dep in direct {
            if dep.is_system() && !options.include_system_packages {
                continue;
            }

            let mut node = DependencyNode::new(dep.clone());

            if options.recursive {
                if !self.is_installed(&dep, cache) {
                    if options.highlight_missing {
                        node.missing = true;
                    }
                    if !options.ignore_errors {
                        return Err(Error::DependencyMissing {
                            parent: parent.to_string(),
                            dependency: dep.to_string(),
                        });
                    }
                    warn!("{}: dependency {} is not installed", parent, dep);
                } else if cache.in_progress(&dep) {
                    debug!("Dependency cycle at {} (via {})", dep, parent);
                    node.cyclic = true;
                    open_cuts.insert(dep.clone());
                } else if !dep.is_system() {
                    let sub = self.expand(&dep, options, cache)?;
                    node.children = sub.children;
                    open_cuts.extend(sub.open_cuts);
                }
            }

            children.push(node);
        }

        Ok(Expansion { children, open_cuts })
    }
}

/// Children of one package plus the cycle cuts that point above it
struct Expansion {
    children: Vec<DependencyNode>,
    open_cuts: HashSet<PackageUrl>,
}

/// Version-insensitive identity: `Libraries/Foo/1.0.3` and `Libraries/Foo/1.0` match
fn package_key(url: &PackageUrl) -> String {
    url.identity()
        .map(|identity| identity.canonical_path())
        .unwrap_or_else(|| url.to_string())
}

fn is_orphan_exempt(canonical_path: &str) -> bool {
    ORPHAN_EXEMPT_CATEGORIES
        .iter()
        .any(|category| Path::new(canonical_path).starts_with(category))
}

fn parse_urls(owner: &PackageUrl, raw: &[String]) -> Vec<PackageUrl> {
    raw.iter()
        .filter_map(|s| match PackageUrl::parse(s) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("{}: ignoring dependency {:?}: {}", owner, s, e);
                None
            }
        })
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metadata::PKGINFO_FILE;
    use std::fs;
    use tempfile::TempDir;

    struct FakeProbe(Vec<&'static str>);

    impl SystemPackageProbe for FakeProbe {
        fn is_installed(&self, name: &str) -> bool {
            self.0.contains(&name)
        }
    }

    fn add_package(tree: &Path, canonical: &str, depends: &[&str]) {
        let dir = tree.join(canonical);
        fs::create_dir_all(&dir).unwrap();
        let list: Vec<String> = depends.iter().map(|d| format!("\"{}\"", d)).collect();
        fs::write(dir.join(PKGINFO_FILE), format!("depends = [{}]\n", list.join(", "))).unwrap();
    }

    fn sample_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let tree = temp_dir.path();
        add_package(tree, "Apps/App/1.0", &["sit://Libraries/A/1.0", "Libraries/B/2.0", "deb://zlib1g"]);
        add_package(tree, "Libraries/A/1.0", &["sit://Libraries/C/1.0"]);
        add_package(tree, "Libraries/B/2.0", &["sit://Libraries/C/1.0"]);
        add_package(tree, "Libraries/C/1.0", &[]);
        temp_dir
    }

    fn recursive() -> ResolveOptions {
        ResolveOptions {
            recursive: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_url_parsing() {
        assert_eq!(PackageUrl::parse("sit://Libraries/Foo/1.0").unwrap(), PackageUrl::sit("Libraries/Foo/1.0"));
        assert_eq!(PackageUrl::parse("${SIT}/Libraries/Foo/1.0").unwrap().path, "Libraries/Foo/1.0");
        assert_eq!(PackageUrl::parse("deb://libxml2").unwrap().scheme, Scheme::Deb);
        assert!(PackageUrl::parse("rpm://foo").is_err());
        assert!(PackageUrl::parse("sit://").is_err());
    }

    #[test]
    fn test_direct_only() {
        let temp_dir = sample_tree();
        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);
        let mut cache = DependencyCache::new();

        let tree = resolver
            .resolve(&PackageUrl::sit("Apps/App/1.0"), &ResolveOptions::default(), &mut cache)
            .unwrap();
        assert_eq!(
            tree.flatten(),
            vec![PackageUrl::sit("Libraries/A/1.0"), PackageUrl::sit("Libraries/B/2.0")]
        );
    }

    #[test]
    fn test_recursive_flatten_and_reduce() {
        let temp_dir = sample_tree();
        let probe = FakeProbe(vec!["zlib1g"]);
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);
        let mut cache = DependencyCache::new();

        let options = ResolveOptions {
            include_system_packages: true,
            ..recursive()
        };
        let tree = resolver.resolve(&PackageUrl::sit("Apps/App/1.0"), &options, &mut cache).unwrap();

        let flat: Vec<String> = tree.flatten().iter().map(|u| u.to_string()).collect();
        assert_eq!(
            flat,
            vec![
                "sit://Libraries/A/1.0",
                "sit://Libraries/C/1.0",
                "sit://Libraries/B/2.0",
                "sit://Libraries/C/1.0",
                "deb://zlib1g",
            ]
        );
        assert_eq!(tree.unique().len(), 4);
        assert!(tree.missing().is_empty());
    }

    #[test]
    fn test_warm_cache_does_no_reads() {
        let temp_dir = sample_tree();
        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);
        let mut cache = DependencyCache::new();
        let url = PackageUrl::sit("Apps/App/1.0");

        let first = resolver.resolve(&url, &recursive(), &mut cache).unwrap();
        let reads = cache.reads();
        assert!(reads > 0);

        let second = resolver.resolve(&url, &recursive(), &mut cache).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.reads(), reads);
    }

    #[test]
    fn test_missing_dependency() {
        let temp_dir = sample_tree();
        add_package(temp_dir.path(), "Apps/Broken/1.0", &["sit://Libraries/Gone/9.9"]);
        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);
        let url = PackageUrl::sit("Apps/Broken/1.0");

        let err = resolver.resolve(&url, &recursive(), &mut DependencyCache::new()).unwrap_err();
        match err {
            Error::DependencyMissing { parent, dependency } => {
                assert_eq!(parent, "sit://Apps/Broken/1.0");
                assert_eq!(dependency, "sit://Libraries/Gone/9.9");
            }
            other => panic!("unexpected error: {}", other),
        }

        let options = ResolveOptions {
            ignore_errors: true,
            highlight_missing: true,
            ..recursive()
        };
        let tree = resolver.resolve(&url, &options, &mut DependencyCache::new()).unwrap();
        assert_eq!(tree.missing(), vec![PackageUrl::sit("Libraries/Gone/9.9")]);
        assert!(tree.to_string().contains("(missing)"));
    }

    #[test]
    fn test_cycle_terminates() {
        let temp_dir = TempDir::new().unwrap();
        add_package(temp_dir.path(), "Libraries/X/1.0", &["sit://Libraries/Y/1.0"]);
        add_package(temp_dir.path(), "Libraries/Y/1.0", &["sit://Libraries/X/1.0"]);
        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);

        let tree = resolver
            .resolve(&PackageUrl::sit("Libraries/X/1.0"), &recursive(), &mut DependencyCache::new())
            .unwrap();
        assert_eq!(tree.children.len(), 1);
        let y = &tree.children[0];
        assert_eq!(y.children.len(), 1);
        assert!(y.children[0].cyclic);
        assert!(y.children[0].children.is_empty());
    }

    #[test]
    fn test_build_dependencies() {
        let temp_dir = sample_tree();
        let dir = temp_dir.path().join("Apps/Tool/1.0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(PKGINFO_FILE),
            "depends = [\"sit://Libraries/B/2.0\"]\nbuildDepends = [\"sit://Libraries/A/1.0\"]\n",
        )
        .unwrap();

        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);
        let options = ResolveOptions {
            build_dependencies: true,
            ..recursive()
        };
        let tree = resolver
            .resolve(&PackageUrl::sit("Apps/Tool/1.0"), &options, &mut DependencyCache::new())
            .unwrap();
        assert_eq!(
            tree.flatten(),
            vec![PackageUrl::sit("Libraries/A/1.0"), PackageUrl::sit("Libraries/C/1.0")]
        );
    }

    #[test]
    fn test_reverse_dependencies() {
        let temp_dir = sample_tree();
        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(temp_dir.path(), &probe);

        let users = resolver.reverse_dependencies(&PackageUrl::sit("Libraries/C/1.0"), &mut DependencyCache::new());
        assert_eq!(users, vec![PackageUrl::sit("Libraries/A/1.0"), PackageUrl::sit("Libraries/B/2.0")]);
    }

    #[test]
    fn test_orphans() {
        let temp_dir = sample_tree();
        let tree = temp_dir.path();
        add_package(tree, "Applications/Viewer/1.0", &[]);
        add_package(tree, "Libraries/Lone/1.0.2", &[]);
        std::os::unix::fs::symlink("1.0.2", tree.join("Libraries/Lone/1.0")).unwrap();

        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(tree, &probe);
        let mut cache = DependencyCache::new();

        let orphans = resolver.orphans(false, &mut cache);
        assert_eq!(orphans, vec![PackageUrl::sit("Apps/App/1.0"), PackageUrl::sit("Libraries/Lone/1.0")]);

        let everything = resolver.orphans(true, &mut cache);
        assert_eq!(everything.len(), 3);
        assert!(everything.contains(&PackageUrl::sit("Applications/Viewer/1.0")));
    }

    #[test]
    fn test_patchlevel_dependency_is_not_orphaned() {
        let temp_dir = TempDir::new().unwrap();
        let tree = temp_dir.path();
        add_package(tree, "Apps/App/1.0", &["sit://Libraries/Foo/1.0.4"]);
        add_package(tree, "Libraries/Foo/1.0.4", &[]);
        std::os::unix::fs::symlink("1.0.4", tree.join("Libraries/Foo/1.0")).unwrap();

        let probe = NoSystemPackages;
        let resolver = DependencyResolver::new(tree, &probe);
        let orphans = resolver.orphans(false, &mut DependencyCache::new());
        assert_eq!(orphans, vec![PackageUrl::sit("Apps/App/1.0")]);
    }
}
