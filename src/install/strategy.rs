// src/install/strategy.rs

//! Where an install writes to
//!
//! The pipeline is the same for every strategy; only the destination tree,
//! the preconditions and the post-install steps differ.

use crate::error::{Error, Result};
use crate::path::PackageIdentity;
use crate::tree::SitLocation;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Into the root tree, with VCS check, install reason and symlink update
    Global,
    /// Into the user's proxy tree
    Proxy,
    /// Into a gzip tarball; the tree is not touched
    Tar {
        /// Defaults to `<source>/install/<name>-<version>[.<pl>].tar.gz`
        output: Option<PathBuf>,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Global => "global",
            Strategy::Proxy => "proxy",
            Strategy::Tar { .. } => "tar",
        }
    }

    pub fn requires_vcs_check(&self) -> bool {
        matches!(self, Strategy::Global)
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, Strategy::Global)
    }

    /// Tarball exports never ask before writing
    pub fn asks_confirmation(&self) -> bool {
        !matches!(self, Strategy::Tar { .. })
    }

    /// Proxy installs are for quick local testing and skip doxygen
    pub fn builds_documentation(&self) -> bool {
        !matches!(self, Strategy::Proxy)
    }

    pub fn mutates_tree(&self) -> bool {
        !matches!(self, Strategy::Tar { .. })
    }

    /// Check the location fits the strategy
    pub fn validate(&self, location: &SitLocation) -> Result<()> {
        match self {
            Strategy::Proxy if !location.is_proxy() => {
                Err(Error::NotProxyTree(location.active_path().to_path_buf()))
            }
            _ => Ok(()),
        }
    }

    /// Tree written by Materialize; `None` for tarball exports
    pub fn target_tree<'a>(&self, location: &'a SitLocation) -> Option<&'a Path> {
        match self {
            Strategy::Global => Some(&location.root_path),
            Strategy::Proxy => location.proxy_path.as_deref(),
            Strategy::Tar { .. } => None,
        }
    }

    /// Archive path for tarball exports
    pub fn archive_path(&self, source_dir: &Path, identity: &PackageIdentity) -> Option<PathBuf> {
        match self {
            Strategy::Tar { output: Some(path) } => Some(path.clone()),
            Strategy::Tar { output: None } => Some(
                source_dir
                    .join("install")
                    .join(format!("{}-{}.tar.gz", identity.name, identity.install_dir_name())),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
