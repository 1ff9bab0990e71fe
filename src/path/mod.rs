// src/path/mod.rs

//! Package identity and canonical path algebra
//!
//! Every package in a Software Installation Tree lives at
//! `<root>/<category>/<name>/<version>[.<patchlevel>]`. The canonical path is
//! the `category/name/version` part, where `category` may itself contain
//! slashes (`DevelopmentTools/Compilers/GCC/4.8`) and `version` is always the
//! normalized `major.minor` pair.
//!
//! Version directories on disk may carry more than that: a patchlevel
//! (`1.0.3`) or an arbitrary suffix (`2.10_experimental`). The verbatim
//! directory name is kept in [`PackageIdentity::version_raw`].

mod placeholder;

pub use placeholder::{SIT_TOKEN, collapse_to_placeholder, expand_placeholders, expand_vars, strip};

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::LazyLock;

static CANONICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\S*/\S+/\d+\.\d+$").expect("valid regex"));

static VERSION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.\d+)").expect("valid regex"));

static SPLIT_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.*(\d*)\.*(.*)$").expect("valid regex"));

static PATCHLEVEL_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.(\d+)$").expect("valid regex"));

/// Identity of one package version within a tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    /// Relative category path, e.g. `Libraries` or `DevelopmentTools/Compilers`
    pub category: String,
    pub name: String,
    /// Normalized `major.minor`
    pub version: String,
    /// Version directory name as found on disk
    pub version_raw: String,
    pub patchlevel: Option<u32>,
}

impl PackageIdentity {
    /// Build an identity from its parts
    ///
    /// `version_raw` is normalized to its leading `major.minor` token.
    pub fn new(category: &str, name: &str, version_raw: &str) -> Result<Self> {
        let category = category.trim_matches('/');
        let invalid = || {
            Error::NotCanonicalPath(format!("{}/{}/{}", category, name, version_raw))
        };

        if category.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        if !is_relative_clean(category) {
            return Err(invalid());
        }

        let version = normalize_version(version_raw).ok_or_else(invalid)?;
        let patchlevel = PATCHLEVEL_DIR_RE
            .captures(version_raw)
            .and_then(|caps| caps[1].parse().ok());

        Ok(Self {
            category: category.to_string(),
            name: name.to_string(),
            version,
            version_raw: version_raw.to_string(),
            patchlevel,
        })
    }

    /// `category/name/version`
    pub fn canonical_path(&self) -> String {
        format!("{}/{}/{}", self.category, self.name, self.version)
    }

    /// Directory name of this installation: `version` or `version.patchlevel`
    pub fn install_dir_name(&self) -> String {
        match self.patchlevel {
            Some(pl) => format!("{}.{}", self.version, pl),
            None => self.version.clone(),
        }
    }

    /// Tree-relative install path: `category/name/version[.patchlevel]`
    pub fn install_path(&self) -> String {
        format!("{}/{}/{}", self.category, self.name, self.install_dir_name())
    }

    /// `category/name`, the key used when comparing versions across packages
    pub fn package_key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    pub fn with_patchlevel(mut self, patchlevel: Option<u32>) -> Self {
        self.patchlevel = patchlevel;
        self
    }

    /// Derive the identity of an installed directory below `tree`
    ///
    /// `tree/Libraries/Foo/1.0.3` yields `Libraries/Foo/1.0` with patchlevel 3.
    pub fn from_install_dir(tree: &Path, dir: &Path) -> Result<Self> {
        let relative = dir
            .strip_prefix(tree)
            .map_err(|_| Error::InvalidPath(format!("{} is not below {}", dir.display(), tree.display())))?;
        parse_canonical_path(&relative.to_string_lossy())
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_path())
    }
}

impl FromStr for PackageIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_canonical_path(s)
    }
}

/// Parse `category/name/version` into a [`PackageIdentity`]
///
/// The last segment must start with `major.minor`; anything after it is kept
/// in `version_raw` and a numeric third component becomes the patchlevel.
///
/// ```
/// use sitkit::path::parse_canonical_path;
///
/// let id = parse_canonical_path("Libraries/Foo/1.0").unwrap();
/// assert_eq!(id.category, "Libraries");
/// assert_eq!(id.canonical_path(), "Libraries/Foo/1.0");
/// assert!(parse_canonical_path("/abs/Foo/1.0").is_err());
/// ```
pub fn parse_canonical_path(path: &str) -> Result<PackageIdentity> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        return Err(Error::NotCanonicalPath(path.to_string()));
    }

    let mut parts = trimmed.rsplitn(3, '/');
    let (version, name, category) = match (parts.next(), parts.next(), parts.next()) {
        (Some(v), Some(n), Some(c)) => (v, n, c),
        _ => return Err(Error::NotCanonicalPath(path.to_string())),
    };

    PackageIdentity::new(category, name, version)
        .map_err(|_| Error::NotCanonicalPath(path.to_string()))
}

/// Strict check: exactly `category/name/major.minor`
pub fn is_canonical_path(path: &str) -> bool {
    CANONICAL_RE.is_match(path) && parse_canonical_path(path).is_ok()
}

/// Leading `major.minor` token of a version directory name
pub fn normalize_version(version_raw: &str) -> Option<String> {
    VERSION_PREFIX_RE
        .captures(version_raw)
        .map(|caps| caps[1].to_string())
}

/// Components of a version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionParts {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
    /// Opaque trailing tag such as `-rc3` or `_experimental`
    pub tag: String,
}

impl VersionParts {
    /// True if `other` shares this version's major.minor
    pub fn same_series(&self, major: u32, minor: u32) -> bool {
        self.major == major && self.minor == minor
    }
}

/// Split `major.minor[.patch][tag]`
///
/// ```
/// use sitkit::path::split_version;
///
/// let parts = split_version("1.2.7").unwrap();
/// assert_eq!((parts.major, parts.minor, parts.patch), (1, 2, Some(7)));
/// assert_eq!(split_version("2.10-rc3").unwrap().tag, "-rc3");
/// ```
pub fn split_version(version: &str) -> Result<VersionParts> {
    let caps = SPLIT_VERSION_RE
        .captures(version)
        .ok_or_else(|| Error::ParseError(format!("invalid version string: {}", version)))?;

    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| Error::ParseError(format!("version component out of range: {}", version)))
    };

    let patch = match &caps[3] {
        "" => None,
        digits => Some(number(digits)?),
    };

    Ok(VersionParts {
        major: number(&caps[1])?,
        minor: number(&caps[2])?,
        patch,
        tag: caps[4].to_string(),
    })
}

fn is_relative_clean(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}
