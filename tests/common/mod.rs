// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use sitkit::install::vcs::VcsAdapter;
use sitkit::{Config, ConsistencyReport, Environment};
use std::fs;
use std::path::{Path, PathBuf};

pub const PLATFORM: &str = "focal64";

pub const REASON: &str = "NEW: first release of the package";

/// Config for tests: one platform, no prompts beyond the symlink update.
pub fn test_config() -> Config {
    Config {
        platforms: vec![PLATFORM.to_string()],
        ..Config::default()
    }
}

/// Environment with an install reason, as if `SIT_INSTALL_REASON` was set.
pub fn test_env() -> Environment {
    Environment {
        install_reason: Some(REASON.to_string()),
        platform: Some(PLATFORM.to_string()),
        ..Environment::default()
    }
}

/// Create a source package at `<base>/<name>/<version>`.
///
/// The package has a script in `bin/`, a header, a platform library and the
/// given extra `pkgInfo.toml` lines.
pub fn make_source(base: &Path, category: &str, name: &str, version: &str, extra: &str) -> PathBuf {
    let dir = base.join(name).join(version);
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::create_dir_all(dir.join("include")).unwrap();
    fs::create_dir_all(dir.join("lib").join(PLATFORM)).unwrap();

    fs::write(dir.join("bin/run.sh"), "#!/bin/sh\necho run\n").unwrap();
    fs::write(dir.join(format!("include/{}.h", name)), "#pragma once\n").unwrap();
    fs::write(
        dir.join("lib").join(PLATFORM).join(format!("lib{}.so", name)),
        name,
    )
    .unwrap();
    fs::write(
        dir.join("pkgInfo.toml"),
        format!("category = \"{}\"\n{}\n", category, extra),
    )
    .unwrap();
    dir
}

/// Create an installed package directly in a tree, bypassing the engine.
pub fn make_installed(tree: &Path, path: &str, depends: &[&str]) -> PathBuf {
    let dir = tree.join(path);
    let lib = dir.join("lib").join(PLATFORM);
    fs::create_dir_all(&lib).unwrap();

    let name = path.split('/').nth(1).unwrap_or("pkg");
    fs::write(lib.join(format!("lib{}.so.1.0.0", name)), path).unwrap();

    let depends: Vec<String> = depends.iter().map(|d| format!("\"{}\"", d)).collect();
    fs::write(
        dir.join("pkgInfo.toml"),
        format!("depends = [{}]\n", depends.join(", ")),
    )
    .unwrap();
    dir
}

/// Files below `dir`, relative and sorted; empty if `dir` does not exist.
pub fn list_files(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .map(|e| e.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}

/// Version control stand-in with a fixed answer.
pub struct FakeVcs {
    pub dirty: bool,
}

impl VcsAdapter for FakeVcs {
    fn name(&self) -> &str {
        "fake"
    }

    fn consistency_check(&self) -> sitkit::Result<Option<ConsistencyReport>> {
        if !self.dirty {
            return Ok(None);
        }
        Ok(Some(ConsistencyReport {
            summary: "1 modified file(s) not committed".to_string(),
            details: vec!["M src/foo.c".to_string()],
            suggestion: "commit first".to_string(),
        }))
    }
}

pub fn clean_vcs() -> Box<dyn VcsAdapter> {
    Box::new(FakeVcs { dirty: false })
}
