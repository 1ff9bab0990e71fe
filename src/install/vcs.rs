// src/install/vcs.rs

//! Working-tree consistency checks before global installs

use crate::error::{ConsistencyReport, Error, Result};
use crate::process;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

pub trait VcsAdapter {
    fn name(&self) -> &str;

    /// `None` when the working tree is clean
    fn consistency_check(&self) -> Result<Option<ConsistencyReport>>;
}

/// `git status --porcelain` on the package directory
#[derive(Debug, Clone)]
pub struct GitAdapter {
    dir: PathBuf,
    timeout: Duration,
    /// Untracked files that do not count, e.g. generated ones
    ignored: Vec<String>,
}

impl GitAdapter {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
            ignored: Vec::new(),
        }
    }

    pub fn with_ignored(mut self, ignored: &[&str]) -> Self {
        self.ignored = ignored.iter().map(|s| s.to_string()).collect();
        self
    }

    fn status(&self) -> Result<String> {
        let child = Command::new("git")
            .args(["status", "--porcelain", "--untracked-files=normal", "."])
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::IoError(format!("failed to run git: {}", e)))?;

        let Some(captured) = process::wait_captured(child, self.timeout)? else {
            return Err(Error::Aborted(format!(
                "git status timed out after {} seconds",
                self.timeout.as_secs()
            )));
        };

        if !captured.status.success() {
            return Err(Error::IoError(format!("git status failed: {}", captured.stderr.trim())));
        }
        Ok(captured.stdout)
    }
}

impl VcsAdapter for GitAdapter {
    fn name(&self) -> &str {
        "git"
    }

    fn consistency_check(&self) -> Result<Option<ConsistencyReport>> {
        info!("Checking working tree in {:?}", self.dir);
        let output = self.status()?;
        let ignored: Vec<&str> = self.ignored.iter().map(String::as_str).collect();
        Ok(report_from_porcelain(&output, &ignored))
    }
}

/// Turn `git status --porcelain` output into a report; `None` if clean
///
/// Untracked paths ending in one of `ignored` are skipped.
pub fn report_from_porcelain(output: &str, ignored: &[&str]) -> Option<ConsistencyReport> {
    let mut modified = Vec::new();
    let mut untracked = Vec::new();

    for line in output.lines().filter(|l| l.len() > 3) {
        let (code, file) = line.split_at(3);
        if code.starts_with("??") {
            if ignored.iter().any(|i| file.ends_with(i)) {
                continue;
            }
            untracked.push(file.to_string());
        } else {
            modified.push(format!("{} {}", code.trim(), file));
        }
    }

    if modified.is_empty() && untracked.is_empty() {
        return None;
    }

    let summary = match (modified.len(), untracked.len()) {
        (0, n) => format!("{} file(s) not under version control", n),
        (n, 0) => format!("{} modified file(s) not committed", n),
        (m, u) => format!("{} modified file(s) not committed, {} file(s) not under version control", m, u),
    };
    let details = modified
        .into_iter()
        .chain(untracked.into_iter().map(|f| format!("? {}", f)))
        .collect();

    Some(ConsistencyReport {
        summary,
        details,
        suggestion: "commit, revert or ignore these files before a global install".to_string(),
    })
}

/// Adapter for the repository containing `dir`, if any
pub fn detect(dir: &Path, timeout: Duration, ignored: &[&str]) -> Option<Box<dyn VcsAdapter>> {
    let found = dir.ancestors().any(|d| d.join(".git").exists());
    if found {
        Some(Box::new(GitAdapter::new(dir, timeout).with_ignored(ignored)))
    } else {
        debug!("{:?} is not under version control", dir);
        None
    }
}
