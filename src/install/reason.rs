// src/install/reason.rs

//! Install reasons and the global install ledger
//!
//! Every global install records why it happened. The reason has the form
//! `TYPE: description` with TYPE one of `DOC`, `FIX`, `IMP` or `NEW`, and is
//! written to `<root>/Temporary/GlobalInstallLogfiles/GlobalInstall_<ts>.json`.
//! Entries are never rewritten; a timestamp collision moves to the next
//! second.

use crate::error::{Error, Result};
use crate::path::PackageIdentity;
use chrono::{DateTime, Duration, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use strum_macros::{Display, EnumString};
use tracing::{debug, info, warn};

/// Ledger directory below the tree root
pub const LEDGER_DIR: &str = "Temporary/GlobalInstallLogfiles";

const MIN_LENGTH: usize = 10;
const MIN_DISTINCT_CHARS: usize = 4;

static REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(DOC|FIX|IMP|NEW):\s+\S+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReasonType {
    /// Documentation
    Doc,
    /// Bugfix
    Fix,
    /// Improvement
    Imp,
    /// New feature
    New,
}

impl ReasonType {
    pub fn description(&self) -> &'static str {
        match self {
            ReasonType::Doc => "documentation",
            ReasonType::Fix => "bugfix",
            ReasonType::Imp => "improvement",
            ReasonType::New => "new feature",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReason {
    pub kind: ReasonType,
    pub message: String,
}

impl InstallReason {
    /// Validate `TYPE: description`
    ///
    /// ```
    /// use sitkit::install::reason::{InstallReason, ReasonType};
    ///
    /// let reason = InstallReason::parse("FIX: crash on empty input").unwrap();
    /// assert_eq!(reason.kind, ReasonType::Fix);
    /// assert!(InstallReason::parse("FIX: aaaa").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = |why: &str| Error::InvalidReason(format!("{:?}: {}", text, why));

        let Some((kind, message)) = text.split_once(':') else {
            return Err(invalid("expected TYPE: description with TYPE one of DOC, FIX, IMP, NEW"));
        };
        let kind: ReasonType = kind
            .parse()
            .map_err(|_| invalid("TYPE must be one of DOC, FIX, IMP, NEW"))?;

        if text.len() < MIN_LENGTH {
            return Err(invalid("too short"));
        }
        if !REASON_RE.is_match(text) {
            return Err(invalid("expected a space after the colon, then a description"));
        }
        let distinct: HashSet<char> = message.trim().chars().collect();
        if distinct.len() < MIN_DISTINCT_CHARS {
            return Err(invalid("not a meaningful description"));
        }

        Ok(Self {
            kind,
            message: message.trim().to_string(),
        })
    }
}

/// One ledger file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub date: String,
    pub time: String,
    pub package: String,
    pub maintainer: String,
    pub is_first_install: bool,
    pub msg_type: ReasonType,
    pub message: String,
}

impl LedgerEntry {
    pub fn new(identity: &PackageIdentity, reason: &InstallReason, is_first_install: bool, now: DateTime<Local>) -> Self {
        Self {
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
            package: identity.install_path(),
            maintainer: current_user(),
            is_first_install,
            msg_type: reason.kind,
            message: reason.message.clone(),
        }
    }
}

/// Login name of the invoking user
pub fn current_user() -> String {
    match nix::unistd::User::from_uid(nix::unistd::getuid()) {
        Ok(Some(user)) => user.name,
        _ => std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
    }
}

/// Write `entry` as a new ledger file below `root`
///
/// Never overwrites an existing file. IO failures are logged and yield
/// `None`; the install itself is not affected.
pub fn write_ledger_entry(root: &Path, entry: &LedgerEntry, now: DateTime<Local>) -> Option<PathBuf> {
    match try_write(root, entry, now) {
        Ok(path) => {
            info!("Install reason logged to {:?}", path);
            Some(path)
        }
        Err(e) => {
            warn!("Unable to write global install log: {}", e);
            None
        }
    }
}

fn try_write(root: &Path, entry: &LedgerEntry, now: DateTime<Local>) -> Result<PathBuf> {
    let dir = root.join(LEDGER_DIR);
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
        if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o777)) {
            debug!("chmod 0777 {:?}: {}", dir, e);
        }
    }

    let content = serde_json::to_string_pretty(entry)
        .map_err(|e| Error::ParseError(format!("ledger entry: {}", e)))?;

    let mut stamp = now;
    loop {
        let path = dir.join(format!("GlobalInstall_{}.json", stamp.format("%Y-%m-%d_%H-%M-%S")));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content.as_bytes())?;
                file.write_all(b"\n")?;
                let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o644));
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                stamp += Duration::seconds(1);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
