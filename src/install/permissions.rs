// src/install/permissions.rs

//! Group ownership and umask for installed files
//!
//! Both are best effort. The installing user often does not own entries
//! that already exist in a shared tree, so failures are collected into
//! [`PermissionWarning`]s and logged instead of aborting the install.

use crate::config::{Config, Environment};
use crate::error::{Error, PermissionWarning, Result};
use crate::metadata::PkgInfo;
use std::fs;
use std::os::unix::fs::{PermissionsExt, lchown};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Effective group and umask for one install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSettings {
    pub group: Option<String>,
    pub umask: Option<u32>,
}

impl PermissionSettings {
    /// Environment first, then package metadata, then config
    pub fn resolve(env: &Environment, info: &PkgInfo, config: &Config) -> Result<Self> {
        let group = env
            .install_group
            .clone()
            .or_else(|| info.install_group.clone())
            .or_else(|| config.install_group.clone());

        let umask = env
            .install_umask
            .as_deref()
            .or(info.install_umask.as_deref())
            .or(config.install_umask.as_deref())
            .map(parse_umask)
            .transpose()?;

        Ok(Self { group, umask })
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_none() && self.umask.is_none()
    }
}

/// Parse an octal umask such as `0002` or `22`
pub fn parse_umask(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    let digits = trimmed.trim_start_matches("0o");
    let mask = u32::from_str_radix(digits, 8)
        .map_err(|_| Error::Config(format!("invalid umask {:?}: expected an octal number", value)))?;
    if mask > 0o777 {
        return Err(Error::Config(format!("invalid umask {:?}: out of range", value)));
    }
    Ok(mask)
}

/// Set the process umask, returning the previous one
pub fn apply_process_umask(mask: u32) -> u32 {
    use nix::sys::stat::{Mode, umask};
    let previous = umask(Mode::from_bits_truncate(mask as nix::libc::mode_t));
    debug!("Process umask {:04o} (was {:04o})", mask, previous.bits());
    previous.bits() as u32
}

/// Numeric gid of `name`; `None` if the group does not exist
pub fn lookup_group(name: &str) -> Option<u32> {
    match nix::unistd::Group::from_name(name) {
        Ok(group) => group.map(|g| g.gid.as_raw()),
        Err(e) => {
            debug!("Group lookup for {:?} failed: {}", name, e);
            None
        }
    }
}

/// Mode for an entry under `umask`: directories and executables start from
/// `0777`, other files from `0666`
pub fn masked_mode(is_dir: bool, current_mode: u32, umask: u32) -> u32 {
    let base = if is_dir || current_mode & 0o111 != 0 {
        0o777
    } else {
        0o666
    };
    base & !umask
}

/// Apply group and umask to everything below `root`
///
/// Symlinks get their group changed but are never chmod-ed. Returns one
/// warning per failed operation kind; an empty list means full success.
pub fn apply(root: &Path, settings: &PermissionSettings) -> Vec<PermissionWarning> {
    let mut warnings = Vec::new();
    if settings.is_empty() || fs::symlink_metadata(root).is_err() {
        return warnings;
    }

    if let Some(group) = &settings.group {
        match lookup_group(group) {
            Some(gid) => {
                info!("Setting group ownership to \"{}\"", group);
                let mut warning = PermissionWarning::new(format!("chgrp {}", group));
                for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
                    if lchown(entry.path(), None, Some(gid)).is_err() {
                        warning.record(entry.path().to_path_buf());
                    }
                }
                if !warning.is_empty() {
                    warnings.push(warning);
                }
            }
            None => {
                let mut warning = PermissionWarning::new(format!("chgrp {} (no such group)", group));
                warning.record(root.to_path_buf());
                warnings.push(warning);
            }
        }
    }

    if let Some(umask) = settings.umask {
        info!("Setting permissions with umask {:04o}", umask);
        let mut warning = PermissionWarning::new(format!("chmod (umask {:04o})", umask));
        for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
            if entry.file_type().is_symlink() {
                continue;
            }
            let current = match entry.metadata() {
                Ok(meta) => meta.permissions().mode(),
                Err(_) => {
                    warning.record(entry.path().to_path_buf());
                    continue;
                }
            };
            let mode = masked_mode(entry.file_type().is_dir(), current, umask);
            if fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode)).is_err() {
                warning.record(entry.path().to_path_buf());
            }
        }
        if !warning.is_empty() {
            warnings.push(warning);
        }
    }

    for warning in &warnings {
        warn!("{}", Error::PermissionDegraded(warning.clone()));
    }
    warnings
}
