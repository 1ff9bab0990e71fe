// src/deps/system.rs

//! System package existence checks for `deb://` dependencies

use crate::process;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for one `dpkg-query` call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers whether an operating system package is installed
pub trait SystemPackageProbe {
    fn is_installed(&self, name: &str) -> bool;
}

/// Queries the Debian package database through `dpkg-query`
#[derive(Debug, Clone, Copy)]
pub struct DpkgProbe {
    timeout: Duration,
}

impl DpkgProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DpkgProbe {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SystemPackageProbe for DpkgProbe {
    fn is_installed(&self, name: &str) -> bool {
        let child = Command::new("dpkg-query")
            .args(["-W", "-f=${Status}", name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!("dpkg-query unavailable, treating {} as not installed: {}", name, e);
                return false;
            }
        };

        match process::wait_captured(child, self.timeout) {
            Ok(Some(captured)) => {
                captured.status.success() && captured.stdout.contains("install ok installed")
            }
            Ok(None) => {
                warn!(
                    "dpkg-query timed out after {} seconds, treating {} as not installed",
                    self.timeout.as_secs(),
                    name
                );
                false
            }
            Err(e) => {
                debug!("dpkg-query failed for {}: {}", name, e);
                false
            }
        }
    }
}

/// For hosts without a system package database: nothing is installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSystemPackages;

impl SystemPackageProbe for NoSystemPackages {
    fn is_installed(&self, _name: &str) -> bool {
        false
    }
}
