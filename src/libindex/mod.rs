// src/libindex/mod.rs

//! Library index: a single directory view of the libraries and executables
//! of a package set
//!
//! A package is added by running a [`Filter`] over its install directory in
//! the tree. With dependency expansion, the transitive (non-system) closure
//! of each package is added as well. The first package to claim a
//! destination keeps it; later claims with a different source are recorded
//! as [`NameClash`]es.
//!
//! Packages carrying a `SkipLibIndex` marker contribute no files, but their
//! dependencies are still followed. A `LinkAllLibraries` marker (or
//! `linkAllLibraries = true` in the metadata) selects every file in the
//! library directories instead of just the shared objects.

mod filter;

pub use filter::{is_library, Filter, Selected};

use crate::deps::{
    self, ConflictReport, DependencyCache, DependencyResolver, PackageUrl, ResolveOptions,
    SystemPackageProbe,
};
use crate::error::{Error, Result};
use crate::install::index::InstallIndex;
use crate::install::materialize::copy_worker;
use crate::install::scan::LINK_ALL_LIBRARIES;
use crate::metadata::PkgInfo;
use crate::tree::proxy::remove_path;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Marker file excluding a package's own files from the index
pub const SKIP_LIB_INDEX: &str = "SkipLibIndex";

/// Default output directory name
pub const DEFAULT_OUTPUT_DIR: &str = "LibIndex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Copy files; symlinks are recreated, not followed
    Copy,
    #[default]
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibIndexOptions {
    /// Also add the dependency closure of each package
    pub recursive: bool,
    /// Reject the package list when its closures disagree on versions
    pub check_conflicts: bool,
    pub platforms: Vec<String>,
}

impl Default for LibIndexOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            check_conflicts: true,
            platforms: Vec::new(),
        }
    }
}

/// Two packages placing different files at the same destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameClash {
    pub destination: PathBuf,
    pub kept: PathBuf,
    pub rejected: PathBuf,
}

/// Result of [`build`]
#[derive(Debug, Default)]
pub struct LibIndex {
    pub index: InstallIndex,
    /// Packages visited, in order
    pub packages: Vec<PackageUrl>,
    pub clashes: Vec<NameClash>,
}

/// Collects packages into a [`LibIndex`]
pub struct LibIndexBuilder<'a> {
    resolver: DependencyResolver<'a>,
    cache: DependencyCache,
    platforms: Vec<String>,
    result: LibIndex,
}

impl<'a> LibIndexBuilder<'a> {
    pub fn new(tree: impl Into<PathBuf>, platforms: Vec<String>, probe: &'a dyn SystemPackageProbe) -> Self {
        Self {
            resolver: DependencyResolver::new(tree, probe),
            cache: DependencyCache::new(),
            platforms,
            result: LibIndex::default(),
        }
    }

    /// Version conflicts between the dependency closures of `packages`
    pub fn detect_conflicts(&mut self, packages: &[PackageUrl]) -> Result<Vec<ConflictReport>> {
        let options = ResolveOptions {
            recursive: true,
            ignore_errors: true,
            ..Default::default()
        };
        let closures = self.resolver.closure_map(packages, &options, &mut self.cache)?;
        Ok(deps::detect_conflicts(&closures))
    }

    /// Add `url` and, if `recursive`, its dependency closure
    pub fn add_package(&mut self, url: &PackageUrl, filter: Filter, recursive: bool) -> Result<()> {
        if url.is_system() || self.result.packages.contains(url) {
            return Ok(());
        }

        let install_root = self.resolver.tree().join(&url.path);
        if !install_root.exists() {
            return Err(Error::NotFound(format!("{} is not installed in {}", url, self.resolver.tree().display())));
        }
        self.result.packages.push(url.clone());

        if install_root.join(SKIP_LIB_INDEX).exists() {
            debug!("{} carries {}, not adding its files", url, SKIP_LIB_INDEX);
        } else {
            let link_all = install_root.join(LINK_ALL_LIBRARIES).exists()
                || PkgInfo::load_or_default(&install_root).link_all_libraries;
            let selected = filter.select(&install_root, &self.platforms, link_all);
            debug!("{}: {} file(s) selected", url, selected.len());
            for file in selected {
                self.add_file(file);
            }
        }

        if recursive {
            let options = ResolveOptions {
                recursive: true,
                ..Default::default()
            };
            let tree = self.resolver.resolve(url, &options, &mut self.cache)?;
            for dep in tree.unique() {
                self.add_package(&dep, filter, false)?;
            }
        }
        Ok(())
    }

    fn add_file(&mut self, file: Selected) {
        match self.result.index.get(&file.destination) {
            Some(existing) if same_target(&existing.source, &file.source) => {}
            Some(existing) => {
                warn!(
                    "{}: already provided by {}, ignoring {}",
                    file.destination.display(),
                    existing.source.display(),
                    file.source.display()
                );
                self.result.clashes.push(NameClash {
                    destination: file.destination,
                    kept: existing.source.clone(),
                    rejected: file.source,
                });
            }
            None => {
                self.result.index.push(file.source, &file.destination);
            }
        }
    }

    pub fn finish(self) -> LibIndex {
        self.result
    }
}

/// Build the index for `packages` in `tree`
///
/// With `options.check_conflicts`, fails with [`Error::DependencyConflict`]
/// before selecting any file.
pub fn build(
    tree: &Path,
    packages: &[PackageUrl],
    filter: Filter,
    options: &LibIndexOptions,
    probe: &dyn SystemPackageProbe,
) -> Result<LibIndex> {
    let mut builder = LibIndexBuilder::new(tree, options.platforms.clone(), probe);

    if options.check_conflicts {
        let reports = builder.detect_conflicts(packages)?;
        if !reports.is_empty() {
            return Err(Error::DependencyConflict(reports));
        }
    }

    for package in packages {
        builder.add_package(package, filter, options.recursive)?;
    }

    let result = builder.finish();
    info!(
        "Indexed {} file(s) from {} package(s)",
        result.index.len(),
        result.packages.len()
    );
    Ok(result)
}

/// Summary of [`materialize`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub written: usize,
    /// Destinations already present with a different real target
    pub clashes: Vec<PathBuf>,
}

/// Write `index` into `out_dir`
///
/// In [`LinkMode::Symlink`], an existing entry pointing elsewhere is left
/// alone and reported; the rest of the index is still written.
pub fn materialize(index: &InstallIndex, mode: LinkMode, out_dir: &Path) -> Result<MaterializeReport> {
    let mut report = MaterializeReport::default();
    fs::create_dir_all(out_dir)?;

    for entry in index.iter() {
        let dst = out_dir.join(&entry.destination);
        match mode {
            LinkMode::Copy => {
                copy_worker(&entry.source, &dst)?;
                report.written += 1;
            }
            LinkMode::Symlink => {
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                if fs::symlink_metadata(&dst).is_ok() {
                    if same_target(&dst, &entry.source) {
                        continue;
                    }
                    warn!(
                        "library name clash: {} exists and does not resolve to {}",
                        dst.display(),
                        entry.source.display()
                    );
                    report.clashes.push(entry.destination.clone());
                    continue;
                }
                symlink(&entry.source, &dst)?;
                report.written += 1;
            }
        }
    }

    info!("Wrote {} entries to {:?}", report.written, out_dir);
    Ok(report)
}

/// Whether two paths resolve to the same file
fn same_target(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// `LD_LIBRARY_PATH` with the library directories of `out_dir` prepended
///
/// ```
/// use sitkit::libindex::library_path;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::create_dir_all(dir.path().join("lib/focal64")).unwrap();
/// let value = library_path(dir.path(), &["focal64".to_string()], Some("/usr/lib"));
/// assert!(value.ends_with("lib/focal64:/usr/lib"));
/// ```
pub fn library_path(out_dir: &Path, platforms: &[String], current: Option<&str>) -> String {
    let mut parts: Vec<String> = platforms
        .iter()
        .flat_map(|p| [out_dir.join(p).join("lib"), out_dir.join("lib").join(p)])
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.to_string_lossy().into_owned())
        .collect();

    if let Some(current) = current.filter(|c| !c.is_empty()) {
        parts.push(current.to_string());
    }
    parts.join(":")
}

/// Delete a previously materialized index
pub fn remove(out_dir: &Path) -> Result<()> {
    if fs::symlink_metadata(out_dir).is_ok() {
        debug!("Removing {:?}", out_dir);
        remove_path(out_dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::NoSystemPackages;
    use tempfile::TempDir;

    const PLATFORM: &str = "focal64";

    fn add_package(tree: &Path, path: &str, libs: &[&str], depends: &[&str]) -> PathBuf {
        let root = tree.join(path);
        let lib = root.join("lib").join(PLATFORM);
        fs::create_dir_all(&lib).unwrap();
        for name in libs {
            fs::write(lib.join(name), path).unwrap();
        }
        let depends: Vec<String> = depends.iter().map(|d| format!("\"sit://{}\"", d)).collect();
        fs::write(
            root.join("pkgInfo.toml"),
            format!("depends = [{}]\n", depends.join(", ")),
        )
        .unwrap();
        root
    }

    fn options() -> LibIndexOptions {
        LibIndexOptions {
            platforms: vec![PLATFORM.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_follows_dependencies() {
        let tree = TempDir::new().unwrap();
        add_package(tree.path(), "Libraries/Foo/1.0", &["libFoo.so.1.0.0"], &["Libraries/Bar/2.1"]);
        add_package(tree.path(), "Libraries/Bar/2.1", &["libBar.so.2.1.0"], &[]);

        let urls = vec![PackageUrl::sit("Libraries/Foo/1.0")];
        let result = build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
        assert_eq!(result.packages.len(), 2);
        assert!(result.index.get(Path::new("lib/focal64/libBar.so.2.1.0")).is_some());

        let flat = LibIndexOptions {
            recursive: false,
            ..options()
        };
        let result = build(tree.path(), &urls, Filter::Libraries, &flat, &NoSystemPackages).unwrap();
        assert_eq!(result.index.len(), 1);
    }

    #[test]
    fn test_skip_marker_still_follows_dependencies() {
        let tree = TempDir::new().unwrap();
        let foo = add_package(tree.path(), "Libraries/Foo/1.0", &["libFoo.so.1.0.0"], &["Libraries/Bar/2.1"]);
        add_package(tree.path(), "Libraries/Bar/2.1", &["libBar.so.2.1.0"], &[]);
        fs::write(foo.join(SKIP_LIB_INDEX), "").unwrap();

        let urls = vec![PackageUrl::sit("Libraries/Foo/1.0")];
        let result = build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
        assert_eq!(result.index.len(), 1);
        assert!(result.index.get(Path::new("lib/focal64/libBar.so.2.1.0")).is_some());
    }

    #[test]
    fn test_clash_keeps_first() {
        let tree = TempDir::new().unwrap();
        add_package(tree.path(), "Libraries/Foo/1.0", &["libz.so.1.2.3"], &[]);
        add_package(tree.path(), "Libraries/Zip/1.0", &["libz.so.1.2.3"], &[]);

        let urls = vec![PackageUrl::sit("Libraries/Foo/1.0"), PackageUrl::sit("Libraries/Zip/1.0")];
        let result = build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
        assert_eq!(result.clashes.len(), 1);
        let entry = result.index.get(Path::new("lib/focal64/libz.so.1.2.3")).unwrap();
        assert!(entry.source.starts_with(tree.path().join("Libraries/Foo")));
    }

    #[test]
    fn test_version_conflict_rejected() {
        let tree = TempDir::new().unwrap();
        add_package(tree.path(), "Libraries/Foo/1.0", &[], &["Libraries/Bar/2.1"]);
        add_package(tree.path(), "Libraries/Baz/1.0", &[], &["Libraries/Bar/3.0"]);
        add_package(tree.path(), "Libraries/Bar/2.1", &[], &[]);
        add_package(tree.path(), "Libraries/Bar/3.0", &[], &[]);

        let urls = vec![PackageUrl::sit("Libraries/Foo/1.0"), PackageUrl::sit("Libraries/Baz/1.0")];
        let err = build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap_err();
        assert!(matches!(err, Error::DependencyConflict(ref r) if r.len() == 1));
    }

    #[test]
    fn test_missing_package() {
        let tree = TempDir::new().unwrap();
        let urls = vec![PackageUrl::sit("Libraries/Nope/1.0")];
        let flat = LibIndexOptions {
            check_conflicts: false,
            ..options()
        };
        assert!(matches!(
            build(tree.path(), &urls, Filter::Libraries, &flat, &NoSystemPackages),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_materialize_symlinks_and_clash() {
        let tree = TempDir::new().unwrap();
        add_package(tree.path(), "Libraries/Foo/1.0", &["libFoo.so.1.0.0"], &[]);
        let urls = vec![PackageUrl::sit("Libraries/Foo/1.0")];
        let result = build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();

        let out = TempDir::new().unwrap();
        let report = materialize(&result.index, LinkMode::Symlink, out.path()).unwrap();
        assert_eq!(report.written, 1);
        let link = out.path().join("lib/focal64/libFoo.so.1.0.0");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

        // same target again: nothing to do
        let again = materialize(&result.index, LinkMode::Symlink, out.path()).unwrap();
        assert_eq!(again.written, 0);
        assert!(again.clashes.is_empty());

        fs::remove_file(&link).unwrap();
        fs::write(&link, "other").unwrap();
        let clash = materialize(&result.index, LinkMode::Symlink, out.path()).unwrap();
        assert_eq!(clash.clashes.len(), 1);

        remove(out.path()).unwrap();
        assert!(!out.path().exists());
    }

    #[test]
    fn test_materialize_copy() {
        let tree = TempDir::new().unwrap();
        add_package(tree.path(), "Libraries/Foo/1.0", &["libFoo.so.1.0.0"], &[]);
        let urls = vec![PackageUrl::sit("Libraries/Foo/1.0")];
        let result = build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();

        let out = TempDir::new().unwrap();
        materialize(&result.index, LinkMode::Copy, out.path()).unwrap();
        let copied = out.path().join("lib/focal64/libFoo.so.1.0.0");
        assert!(fs::symlink_metadata(&copied).unwrap().is_file());
        assert_eq!(fs::read_to_string(copied).unwrap(), "Libraries/Foo/1.0");
    }
}
