// src/error.rs

//! Error types for sitkit
//!
//! Structural and precondition failures (`NotCanonicalPath`, `NotProxyTree`,
//! `DirtyWorkingTree`, `UnsafeDirectory`, `InvalidPattern`) abort the current
//! operation. `PermissionDegraded` is only ever logged; it is carried as an
//! error value so callers can render it uniformly.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::deps::ConflictReport;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("not a canonical package path: {0} (expected <category>/<name>/<major>.<minor>)")]
    NotCanonicalPath(String),

    #[error("{parent}: dependency {dependency} is not installed")]
    DependencyMissing { parent: String, dependency: String },

    #[error("{}", format_conflicts(.0))]
    DependencyConflict(Vec<ConflictReport>),

    #[error("invalid pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{} is not a proxy tree (no parentTree link)", .0.display())]
    NotProxyTree(PathBuf),

    #[error("{}", .0)]
    DirtyWorkingTree(ConsistencyReport),

    #[error("refusing to remove {}: found {marker}, this looks like a source tree", path.display())]
    UnsafeDirectory { path: PathBuf, marker: String },

    #[error("{0}")]
    PermissionDegraded(PermissionWarning),

    #[error("invalid install reason: {0}")]
    InvalidReason(String),

    #[error("hook {name} failed: {reason}")]
    HookFailed { name: String, reason: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("operation aborted: {0}")]
    Aborted(String),
}

fn format_conflicts(reports: &[ConflictReport]) -> String {
    let mut out = format!("{} dependency conflict(s):", reports.len());
    for report in reports {
        out.push_str("\n  ");
        out.push_str(&report.to_string());
    }
    out
}

/// Outcome of a failed version control consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// One-line summary, e.g. "modified files not committed"
    pub summary: String,
    /// Offending entries, one per file
    pub details: Vec<String>,
    /// What the user should do about it
    pub suggestion: String,
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        for line in &self.details {
            write!(f, "\n  {}", line)?;
        }
        if !self.suggestion.is_empty() {
            write!(f, "\n{}", self.suggestion)?;
        }
        Ok(())
    }
}

/// Aggregated ownership/mode failures of one permission pass
///
/// Only the first few paths are kept; `failures` holds the full count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionWarning {
    /// The operation that failed, e.g. `chgrp staff` or `chmod (umask 0022)`
    pub operation: String,
    pub failures: usize,
    pub sample: Vec<PathBuf>,
}

impl PermissionWarning {
    /// Number of paths kept in `sample`
    pub const SAMPLE_SIZE: usize = 5;

    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            failures: 0,
            sample: Vec::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf) {
        self.failures += 1;
        if self.sample.len() < Self::SAMPLE_SIZE {
            self.sample.push(path);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.failures == 0
    }
}

impl fmt::Display for PermissionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unable to {} on {} path(s)", self.operation, self.failures)?;
        if !self.sample.is_empty() {
            let shown: Vec<String> = self
                .sample
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            write!(f, ": {}", shown.join(", "))?;
            if self.failures > self.sample.len() {
                write!(f, ", ...")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_warning_keeps_sample() {
        let mut warning = PermissionWarning::new("chgrp staff");
        assert!(warning.is_empty());
        for i in 0..8 {
            warning.record(PathBuf::from(format!("/sit/pkg/file{}", i)));
        }
        assert_eq!(warning.failures, 8);
        assert_eq!(warning.sample.len(), PermissionWarning::SAMPLE_SIZE);

        let text = warning.to_string();
        assert!(text.starts_with("unable to chgrp staff on 8 path(s)"));
        assert!(text.ends_with(", ..."));
    }

    #[test]
    fn test_consistency_report_display() {
        let report = ConsistencyReport {
            summary: "modified files not committed".to_string(),
            details: vec!["src/foo.c".to_string()],
            suggestion: "commit or revert your changes".to_string(),
        };
        let err = Error::DirtyWorkingTree(report);
        let text = err.to_string();
        assert!(text.contains("modified files not committed"));
        assert!(text.contains("src/foo.c"));
    }
}
