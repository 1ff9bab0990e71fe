// src/lib.rs

//! sitkit: Software Installation Tree manager
//!
//! A Software Installation Tree (SIT) is a shared directory of versioned
//! packages laid out as `<category>/<name>/<major>.<minor>`, where the
//! two-part version is usually a symlink to the newest patchlevel
//! directory (`1.0` -> `1.0.3`). Developers overlay the shared root tree
//! with a per-user proxy tree made mostly of symlinks into the root, so
//! they can install packages privately without touching the root.
//!
//! # Architecture
//!
//! - [`path`]: canonical package paths, version parsing, `${SIT}` placeholders
//! - [`tree`]: active tree resolution, proxy creation and maintenance
//! - [`deps`]: dependency resolution with a per-operation cache, batch
//!   conflict detection
//! - [`install`]: the staged install pipeline (global, proxy, tarball)
//! - [`patchlevel`]: patchlevel allocation and current-version symlinks
//! - [`libindex`]: fused library views over a package closure

pub mod config;
pub mod deps;
mod error;
pub mod install;
pub mod libindex;
pub mod metadata;
pub mod path;
pub mod patchlevel;
pub mod prompt;
mod process;
pub mod tree;

pub use config::{Config, Environment};
pub use deps::{DependencyCache, DependencyResolver, PackageUrl, ResolveOptions};
pub use error::{ConsistencyReport, Error, PermissionWarning, Result};
pub use install::{InstallEngine, InstallOutcome, Strategy};
pub use path::PackageIdentity;
pub use patchlevel::PatchlevelManager;
pub use tree::{SitLocation, TreeResolver};
