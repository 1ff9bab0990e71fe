// src/libindex/filter.rs

//! Which files of a package go into a library index

use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SO_VERSIONED: LazyLock<Pattern> = LazyLock::new(|| Pattern::new("*.so.*.*").expect("valid pattern"));
static SYMS: LazyLock<Pattern> = LazyLock::new(|| Pattern::new("*.syms").expect("valid pattern"));
static DLL: LazyLock<Pattern> = LazyLock::new(|| Pattern::new("*.dll*").expect("valid pattern"));
static SO: LazyLock<Pattern> = LazyLock::new(|| Pattern::new("*.so*").expect("valid pattern"));
static LIB: LazyLock<Pattern> = LazyLock::new(|| Pattern::new("*.lib*").expect("valid pattern"));

/// Never fused into a single directory
const FUSE_EXCLUDED_SUFFIXES: [&str; 3] = [".egg-info", ".py", ".pth"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Shared libraries from `lib/<platform>` and `<platform>/lib`, layout kept
    Libraries,
    /// Everything from the library and `bin/<platform>` directories, fused
    /// into `<platform>/`
    FuseIntoSingleDirectory,
    /// Libraries plus `bin/<platform>`, layout kept
    MainPackage,
}

/// One file selected by a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Filter {
    /// Select files below `install_root` for all `platforms`
    ///
    /// With `link_all`, every file in the library directories qualifies.
    /// [`Filter::FuseIntoSingleDirectory`] ignores `link_all`.
    pub fn select(&self, install_root: &Path, platforms: &[String], link_all: bool) -> Vec<Selected> {
        let mut out = Vec::new();
        for platform in platforms {
            match self {
                Filter::Libraries => {
                    let tail = Path::new("lib").join(platform);
                    select_libraries(install_root, &tail, &tail, link_all, true, &mut out);
                    let tail = Path::new(platform).join("lib");
                    select_libraries(install_root, &tail, &tail, link_all, false, &mut out);
                }
                Filter::FuseIntoSingleDirectory => {
                    let fused = Path::new(platform);
                    for tail in [Path::new("lib").join(platform), Path::new(platform).join("lib")] {
                        for name in entries(&install_root.join(&tail)) {
                            if FUSE_EXCLUDED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                                continue;
                            }
                            out.push(Selected {
                                source: install_root.join(&tail).join(&name),
                                destination: fused.join(&name),
                            });
                        }
                    }
                    select_all(install_root, &Path::new("bin").join(platform), fused, &mut out);
                }
                Filter::MainPackage => {
                    let tail = Path::new("lib").join(platform);
                    select_libraries(install_root, &tail, &tail, link_all, false, &mut out);
                    let tail = Path::new("bin").join(platform);
                    select_all(install_root, &tail, &tail, &mut out);
                }
            }
        }
        out
    }
}

/// Whether `name` in `dir` looks like a shared or import library
pub fn is_library(dir: &Path, name: &str, with_syms: bool) -> bool {
    let is_link = || fs::symlink_metadata(dir.join(name)).is_ok_and(|m| m.file_type().is_symlink());

    SO_VERSIONED.matches(name)
        || (with_syms && SYMS.matches(name))
        || DLL.matches(name)
        || (SO.matches(name) && !is_link())
        || (LIB.matches(name) && !is_link())
}

fn select_libraries(
    install_root: &Path,
    tail: &Path,
    dst_dir: &Path,
    link_all: bool,
    with_syms: bool,
    out: &mut Vec<Selected>,
) {
    let dir = install_root.join(tail);
    for name in entries(&dir) {
        if link_all || is_library(&dir, &name, with_syms) {
            out.push(Selected {
                source: dir.join(&name),
                destination: dst_dir.join(&name),
            });
        }
    }
}

fn select_all(install_root: &Path, tail: &Path, dst_dir: &Path, out: &mut Vec<Selected>) {
    let dir = install_root.join(tail);
    for name in entries(&dir) {
        out.push(Selected {
            source: dir.join(&name),
            destination: dst_dir.join(&name),
        });
    }
}

/// Sorted names of the non-directory entries of `dir`; symlinks count
fn entries(dir: &Path) -> Vec<String> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| !t.is_dir()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn package() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("lib/focal64");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("libFoo.so.1.0"), "").unwrap();
        symlink("libFoo.so.1.0", lib.join("libFoo.so")).unwrap();
        fs::write(lib.join("libFoo.syms"), "").unwrap();
        fs::write(lib.join("libFoo.a"), "").unwrap();
        fs::write(lib.join("helper.py"), "").unwrap();

        let rev = temp_dir.path().join("focal64/lib");
        fs::create_dir_all(&rev).unwrap();
        fs::write(rev.join("libcv.so"), "").unwrap();

        let bin = temp_dir.path().join("bin/focal64");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("tool"), "").unwrap();
        temp_dir
    }

    fn destinations(selected: &[Selected]) -> Vec<String> {
        selected
            .iter()
            .map(|s| s.destination.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_libraries_filter() {
        let pkg = package();
        let platforms = vec!["focal64".to_string()];
        let dsts = destinations(&Filter::Libraries.select(pkg.path(), &platforms, false));
        assert_eq!(
            dsts,
            vec!["lib/focal64/libFoo.so.1.0", "lib/focal64/libFoo.syms", "focal64/lib/libcv.so"]
        );

        let all = destinations(&Filter::Libraries.select(pkg.path(), &platforms, true));
        assert!(all.contains(&"lib/focal64/libFoo.a".to_string()));
        assert!(all.contains(&"lib/focal64/libFoo.so".to_string()));
    }

    #[test]
    fn test_fuse_filter() {
        let pkg = package();
        let dsts = destinations(&Filter::FuseIntoSingleDirectory.select(pkg.path(), &["focal64".to_string()], false));
        assert!(dsts.contains(&"focal64/libFoo.so".to_string()));
        assert!(dsts.contains(&"focal64/libcv.so".to_string()));
        assert!(dsts.contains(&"focal64/tool".to_string()));
        assert!(!dsts.iter().any(|d| d.ends_with(".py")));
    }

    #[test]
    fn test_main_package_filter() {
        let pkg = package();
        let dsts = destinations(&Filter::MainPackage.select(pkg.path(), &["focal64".to_string()], false));
        assert_eq!(dsts, vec!["lib/focal64/libFoo.so.1.0", "bin/focal64/tool"]);
    }
}
