// src/metadata.rs

//! Package metadata (`pkgInfo.toml`)
//!
//! Every package carries a small TOML file at its top level. Source trees
//! use it to describe what to install; installed packages keep a copy so
//! the dependency resolver can read `depends` without the sources.
//!
//! # Example pkgInfo.toml
//!
//! ```toml
//! name = "Foo"
//! version = "1.0"
//! category = "Libraries"
//! depends = ["sit://Libraries/Bar/2.0", "deb://libxml2"]
//! usePatchlevels = true
//!
//! install = ["data", ["config/${MAKEFILE_PLATFORM}", "etc"]]
//! installMatching = [["doc", '.*\.md$'], ["scripts", '.*\.sh$', "bin"]]
//! installSymlinks = [["doc/examples", "examples"]]
//! installExclude = ["data/private"]
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// File name of the metadata file
pub const PKGINFO_FILE: &str = "pkgInfo.toml";

/// How an existing installation is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// Write over the existing installation
    #[default]
    Incremental,
    /// Remove the existing installation first
    Clean,
}

/// A copy rule: a path, or a `[source, destination]` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CopyRule {
    Same(String),
    Renamed(String, String),
}

impl CopyRule {
    pub fn source(&self) -> &str {
        match self {
            Self::Same(src) | Self::Renamed(src, _) => src,
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            Self::Same(src) => src,
            Self::Renamed(_, dst) => dst,
        }
    }
}

/// A pattern rule: `[directory, regex]` or `[directory, regex, destination]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchRule {
    InPlace(String, String),
    Moved(String, String, String),
}

impl MatchRule {
    pub fn directory(&self) -> &str {
        match self {
            Self::InPlace(dir, _) | Self::Moved(dir, _, _) => dir,
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Self::InPlace(_, pattern) | Self::Moved(_, pattern, _) => pattern,
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            Self::InPlace(dir, _) => dir,
            Self::Moved(_, _, dst) => dst,
        }
    }
}

/// Contents of `pkgInfo.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PkgInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub category: Option<String>,
    pub maintainer: Option<String>,

    /// Runtime dependencies as package URLs
    pub depends: Vec<String>,
    /// Build-time dependencies as package URLs
    pub build_depends: Vec<String>,

    pub install: Vec<CopyRule>,
    pub install_matching: Vec<MatchRule>,
    /// `[target, link]` pairs
    pub install_symlinks: Vec<(String, String)>,
    /// Source prefixes removed from the install index
    pub install_exclude: Vec<String>,
    pub install_group: Option<String>,
    pub install_umask: Option<String>,
    pub install_mode: InstallMode,

    pub use_patchlevels: bool,
    pub patchlevel: Option<u32>,
    pub link_all_libraries: bool,
}

impl PkgInfo {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ParseError(format!("{}: {}", PKGINFO_FILE, e)))
    }

    /// Read `<dir>/pkgInfo.toml`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PKGINFO_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Like [`PkgInfo::load`], but a missing or unreadable file is empty metadata
    pub fn load_or_default(dir: &Path) -> Self {
        match Self::load(dir) {
            Ok(info) => info,
            Err(e) => {
                debug!("No usable metadata in {:?}: {}", dir, e);
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ParseError(e.to_string()))
    }
}
