// src/install/scan.rs

//! Scanning a source package into an [`InstallIndex`]
//!
//! Rules are applied in three passes: essentials (files every installed
//! package must carry), defaults (the conventional directory layout) and
//! the custom rules from `pkgInfo.toml`. Excludes are applied last.
//!
//! Any rule containing `${MAKEFILE_PLATFORM}` is applied once per
//! configured platform, so one rule installs all architectures.

use super::index::{InstallIndex, clean_relative};
use crate::error::{Error, Result};
use crate::metadata::PkgInfo;
use crate::path::expand_vars;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const PLATFORM_TOKEN: &str = "${MAKEFILE_PLATFORM}";

/// Directory names never installed
const VCS_DIRS: [&str; 2] = [".svn", ".git"];

/// Name of the marker file requesting all libraries in a library index
pub const LINK_ALL_LIBRARIES: &str = "LinkAllLibraries";

/// Builds the install index for one package
pub struct Scanner {
    source_dir: PathBuf,
    /// Tree-relative install root, e.g. `Libraries/Foo/1.0.3`
    start_path: PathBuf,
    platforms: Vec<String>,
    /// Where staged symlinks are created
    temp_dir: PathBuf,
    index: InstallIndex,
}

impl Scanner {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        start_path: impl Into<PathBuf>,
        platforms: Vec<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            start_path: start_path.into(),
            platforms,
            temp_dir: temp_dir.into(),
            index: InstallIndex::new(),
        }
    }

    pub fn index(&self) -> &InstallIndex {
        &self.index
    }

    pub fn into_index(self) -> InstallIndex {
        self.index
    }

    /// Run essentials, defaults, custom rules and excludes
    pub fn scan(&mut self, info: &PkgInfo) -> Result<()> {
        self.collect_essentials()?;
        self.collect_defaults(info)?;
        self.collect_custom(info)?;
        self.index.exclude(&info.install_exclude);
        info!("Scheduled {} files for installation", self.index.len());
        Ok(())
    }

    pub fn collect_essentials(&mut self) -> Result<()> {
        self.copy("install/BashSrc", Some("BashSrc"), true)?;
        self.copy("install/pkgInfo.toml", Some("pkgInfo.toml"), true)
    }

    pub fn collect_defaults(&mut self, info: &PkgInfo) -> Result<()> {
        self.copy_matching("bin", r".*\.(m|php|py|sh)$", Some("bin"))?;
        self.copy_matching("bin/${MAKEFILE_PLATFORM}", ".*", None)?;

        self.copy("data", None, false)?;
        self.copy("doc/doxygen.tag", None, false)?;
        self.copy("doc/html", None, false)?;
        self.copy_matching("doc", r".*\.(jpg|log|pdf|png|txt)$", None)?;
        self.copy("etc", None, false)?;
        self.copy("include", None, false)?;
        self.copy_matching("install", r".*\.jar$", Some("lib"))?;

        self.copy_matching("lib", r".*\.jar$", Some("lib"))?;
        self.copy_matching(
            "lib/${MAKEFILE_PLATFORM}",
            ".*(a|def|dll|exp|lib|manifest|mex|mexa64|pck|so)",
            None,
        )?;

        if info.link_all_libraries {
            let marker = self.source_dir.join("install").join(LINK_ALL_LIBRARIES);
            if !marker.exists() {
                fs::create_dir_all(self.source_dir.join("install"))?;
                fs::write(&marker, "")?;
            }
            self.copy("install/LinkAllLibraries", Some(LINK_ALL_LIBRARIES), true)?;
        }

        self.copy("pymodules", None, false)?;
        self.copy("sbin", None, false)?;
        self.copy_matching("src", r".*\.(h|hpp)$", Some("include"))?;
        self.copy("web", None, false)
    }

    pub fn collect_custom(&mut self, info: &PkgInfo) -> Result<()> {
        for rule in &info.install {
            debug!("Custom install rule: {} -> {}", rule.source(), rule.destination());
            self.copy(rule.source(), Some(rule.destination()), false)?;
        }

        for rule in &info.install_matching {
            debug!(
                "Custom install rule: {}/<{}> -> {}",
                rule.directory(),
                rule.pattern(),
                rule.destination()
            );
            self.copy_matching(rule.directory(), rule.pattern(), Some(rule.destination()))?;
        }

        for (target, link) in &info.install_symlinks {
            debug!("Custom symlink rule: {} -> {}", link, target);
            self.link(target, link)?;
        }
        Ok(())
    }

    /// Schedule a file or directory tree
    ///
    /// A missing optional source is skipped; a missing mandatory one is an
    /// error.
    pub fn copy(&mut self, src: &str, dst: Option<&str>, mandatory: bool) -> Result<()> {
        for (src, dst) in self.per_platform(src, dst) {
            self.copy_one(&src, dst.as_deref(), mandatory)?;
        }
        Ok(())
    }

    /// Schedule the entries of `src_dir` whose names match `pattern`
    ///
    /// Returns the number of matching entries.
    pub fn copy_matching(&mut self, src_dir: &str, pattern: &str, dst_dir: Option<&str>) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut total = 0;
        for (src, dst) in self.per_platform(src_dir, dst_dir) {
            total += self.copy_matching_one(&src, &regex, dst.as_deref())?;
        }
        Ok(total)
    }

    /// Schedule a symlink `link -> target` inside the install root
    pub fn link(&mut self, target: &str, link: &str) -> Result<()> {
        let dst = self.start_path.join(expand_env(link));
        self.link_at(&expand_env(target), &dst)
    }

    /// Schedule a symlink at a tree-relative location
    pub fn link_in_tree(&mut self, target: &str, link: &str) -> Result<()> {
        self.link_at(target, Path::new(link))
    }

    fn link_at(&mut self, target: &str, destination: &Path) -> Result<()> {
        fs::create_dir_all(&self.temp_dir)?;
        let staged = self.temp_dir.join(format!("install-{}", uuid::Uuid::new_v4()));
        std::os::unix::fs::symlink(target, &staged)?;

        info!("Adding {} --> {}", destination.display(), target);
        self.index.push(staged.clone(), destination);
        self.index.add_temp_object(staged);
        Ok(())
    }

    fn per_platform(&self, src: &str, dst: Option<&str>) -> Vec<(String, Option<String>)> {
        let multi_arch = src.contains(PLATFORM_TOKEN) || dst.is_some_and(|d| d.contains(PLATFORM_TOKEN));
        if !multi_arch {
            return vec![(src.to_string(), dst.map(str::to_string))];
        }
        self.platforms
            .iter()
            .map(|platform| {
                (
                    src.replace(PLATFORM_TOKEN, platform),
                    dst.map(|d| d.replace(PLATFORM_TOKEN, platform)),
                )
            })
            .collect()
    }

    fn copy_one(&mut self, src: &str, dst: Option<&str>, mandatory: bool) -> Result<()> {
        let src = expand_env(src);
        let dst = dst.map(expand_env).filter(|d| !d.is_empty()).unwrap_or_else(|| src.clone());
        let abs = self.source_dir.join(&src);

        let meta = match fs::symlink_metadata(&abs) {
            Ok(meta) => meta,
            Err(_) if !mandatory => return Ok(()),
            Err(_) => {
                return Err(Error::NotFound(format!(
                    "mandatory file missing: {}",
                    abs.display()
                )));
            }
        };

        if src == dst {
            info!("Adding {}", dst);
        } else {
            info!("Adding {} --> {}", src, dst);
        }

        if meta.is_dir() {
            self.copy_tree(Path::new(&src), Path::new(&dst))
        } else {
            self.index.push(PathBuf::from(&src), self.start_path.join(&dst));
            Ok(())
        }
    }

    fn copy_tree(&mut self, src: &Path, dst: &Path) -> Result<()> {
        let root = self.source_dir.join(src);
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !VCS_DIRS.iter().any(|vcs| e.file_name() == *vcs));

        for entry in walker {
            let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| Error::InvalidPath(e.to_string()))?
                .to_path_buf();
            let item_src = src.join(&relative);
            let item_dst = dst.join(&relative);

            if entry.file_type().is_dir() {
                continue;
            }

            if entry.file_type().is_symlink() && entry.path().is_dir() {
                // symlinked directories are recreated as links, not copied
                let target = fs::read_link(entry.path())?;
                debug!("Found symlink to directory: {:?} --> {:?}", item_src, target);
                let dst = self.start_path.join(&item_dst);
                self.link_at(&target.to_string_lossy(), &dst)?;
                continue;
            }

            self.index.push(item_src, self.start_path.join(&item_dst));
        }
        Ok(())
    }

    fn copy_matching_one(&mut self, src_dir: &str, regex: &Regex, dst_dir: Option<&str>) -> Result<usize> {
        let src_dir = match expand_env(src_dir) {
            dir if dir.is_empty() => ".".to_string(),
            dir => dir,
        };
        let dst_dir = dst_dir.map(expand_env).unwrap_or_else(|| src_dir.clone());

        let abs = self.source_dir.join(&src_dir);
        if !abs.is_dir() {
            debug!("Searching for subdir {:?}... not found", src_dir);
            return Ok(0);
        }

        let mut names: Vec<String> = fs::read_dir(&abs)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| regex.is_match(name))
            .collect();
        names.sort();

        for name in &names {
            let src = clean_relative(&Path::new(&src_dir).join(name));
            let dst = clean_relative(&Path::new(&dst_dir).join(name));
            let entry_path = self.source_dir.join(&src);

            let is_real_dir = fs::symlink_metadata(&entry_path).is_ok_and(|m| m.is_dir());
            if is_real_dir {
                self.copy_tree(&src, &dst)?;
            } else {
                self.index.push(src, self.start_path.join(&dst));
            }
        }

        if names.is_empty() {
            debug!("Not found: {}/<{}>", src_dir, regex.as_str());
        } else {
            info!("Adding {}/<{}>", dst_dir, regex.as_str());
        }
        Ok(names.len())
    }
}

fn expand_env(s: &str) -> String {
    expand_vars(s, |name| std::env::var(name).ok())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metadata::{CopyRule, MatchRule};
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn write(base: &Path, rel: &str) {
        let path = base.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn package() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path();
        write(src, "install/BashSrc");
        write(src, "install/pkgInfo.toml");
        write(src, "bin/run.sh");
        write(src, "bin/notes.md");
        write(src, "bin/focal64/tool");
        write(src, "bin/jammy64/tool");
        write(src, "lib/focal64/libFoo.so");
        write(src, "include/Foo.h");
        write(src, "include/.git/HEAD");
        write(src, "src/Foo.h");
        write(src, "src/Foo.c");
        write(src, "data/private/key");
        write(src, "data/public/table.csv");
        temp_dir
    }

    fn scanner(src: &Path, temp: &Path) -> Scanner {
        Scanner::new(
            src,
            "Libraries/Foo/1.0",
            vec!["focal64".to_string(), "jammy64".to_string()],
            temp,
        )
    }

    fn destinations(index: &InstallIndex) -> Vec<String> {
        index
            .iter()
            .map(|e| e.destination.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_default_layout() {
        let src = package();
        let temp = TempDir::new().unwrap();
        let mut scanner = scanner(src.path(), temp.path());
        scanner.scan(&PkgInfo::default()).unwrap();

        let dsts = destinations(scanner.index());
        for expected in [
            "Libraries/Foo/1.0/BashSrc",
            "Libraries/Foo/1.0/pkgInfo.toml",
            "Libraries/Foo/1.0/bin/run.sh",
            "Libraries/Foo/1.0/bin/focal64/tool",
            "Libraries/Foo/1.0/bin/jammy64/tool",
            "Libraries/Foo/1.0/lib/focal64/libFoo.so",
            "Libraries/Foo/1.0/include/Foo.h",
            "Libraries/Foo/1.0/data/private/key",
        ] {
            assert!(dsts.contains(&expected.to_string()), "missing {}", expected);
        }
        assert!(!dsts.iter().any(|d| d.contains(".git")));
        assert!(!dsts.iter().any(|d| d.ends_with("notes.md")));
        assert!(!dsts.iter().any(|d| d.ends_with("Foo.c")));
    }

    #[test]
    fn test_missing_essentials() {
        let src = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let mut scanner = scanner(src.path(), temp.path());
        assert!(matches!(scanner.collect_essentials(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_exclude_filters_index() {
        let src = package();
        let temp = TempDir::new().unwrap();
        let mut scanner = scanner(src.path(), temp.path());
        let info = PkgInfo {
            install_exclude: vec!["data/private".to_string()],
            ..PkgInfo::default()
        };
        scanner.scan(&info).unwrap();

        let dsts = destinations(scanner.index());
        assert!(dsts.contains(&"Libraries/Foo/1.0/data/public/table.csv".to_string()));
        assert!(!dsts.iter().any(|d| d.contains("private")));
    }

    #[test]
    fn test_custom_rules_and_platform_expansion() {
        let src = package();
        write(src.path(), "config/focal64/app.conf");
        write(src.path(), "config/jammy64/app.conf");
        write(src.path(), "scripts/a.sh");
        let temp = TempDir::new().unwrap();
        let mut scanner = scanner(src.path(), temp.path());

        let info = PkgInfo {
            install: vec![CopyRule::Renamed(
                "config/${MAKEFILE_PLATFORM}".to_string(),
                "etc/${MAKEFILE_PLATFORM}".to_string(),
            )],
            install_matching: vec![MatchRule::Moved(
                "scripts".to_string(),
                r"\.sh$".to_string(),
                "bin".to_string(),
            )],
            install_symlinks: vec![("bin/focal64".to_string(), "current".to_string())],
            ..PkgInfo::default()
        };
        scanner.collect_custom(&info).unwrap();

        let dsts = destinations(scanner.index());
        assert!(dsts.contains(&"Libraries/Foo/1.0/etc/focal64/app.conf".to_string()));
        assert!(dsts.contains(&"Libraries/Foo/1.0/etc/jammy64/app.conf".to_string()));
        assert!(dsts.contains(&"Libraries/Foo/1.0/bin/a.sh".to_string()));

        let link = scanner.index().get(Path::new("Libraries/Foo/1.0/current")).unwrap();
        assert!(link.source.starts_with(temp.path()));
        assert_eq!(fs::read_link(&link.source).unwrap(), PathBuf::from("bin/focal64"));
        assert_eq!(scanner.index().temp_objects().len(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        let src = package();
        let temp = TempDir::new().unwrap();
        let mut scanner = scanner(src.path(), temp.path());
        let err = scanner.copy_matching("doc", "*.pdf", None).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_symlinked_directory_becomes_link() {
        let src = package();
        symlink("focal64", src.path().join("bin/noble64")).unwrap();
        let temp = TempDir::new().unwrap();
        let mut scanner = scanner(src.path(), temp.path());
        scanner.copy("bin", None, false).unwrap();

        let entry = scanner.index().get(Path::new("Libraries/Foo/1.0/bin/noble64")).unwrap();
        assert_eq!(fs::read_link(&entry.source).unwrap(), PathBuf::from("focal64"));
        assert!(scanner.index().get(Path::new("Libraries/Foo/1.0/bin/noble64/tool")).is_none());
    }
}
