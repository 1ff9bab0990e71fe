// src/config.rs

//! Tool configuration
//!
//! Settings come from two layers:
//!
//! - a TOML file (`$SITKIT_CONFIG`, else `<config dir>/sitkit/config.toml`)
//! - environment variables captured once per process in [`Environment`]
//!
//! Environment values win over the file, and package metadata sits between
//! the two for per-package settings such as the install group.
//!
//! # Example config.toml
//!
//! ```toml
//! root_base = "/hri/sit"
//! epoch = "latest"
//! platforms = ["focal64", "jammy64"]
//! install_group = "hriall"
//! install_umask = "0002"
//! ask_install_reason = true
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "SITKIT_CONFIG";

/// Default location of root trees
pub const DEFAULT_ROOT_BASE: &str = "/hri/sit";

/// Per-user proxy trees live below `$HOME/<this>`
pub const DEFAULT_PROXY_SUBDIR: &str = ".HRI/sit";

/// Epoch used when neither config nor environment name one
pub const DEFAULT_EPOCH: &str = "latest";

const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 300;

/// Settings read from the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit tree to use instead of proxy/root discovery
    pub tree: Option<PathBuf>,
    /// Directory holding one root tree per epoch
    pub root_base: PathBuf,
    /// Directory holding one proxy tree per epoch (default `~/.HRI/sit`)
    pub proxy_base: Option<PathBuf>,
    /// Tree epoch label, e.g. `latest` or `testing`
    pub epoch: String,
    /// Platforms considered when scanning `bin/<platform>` and `lib/<platform>`
    pub platforms: Vec<String>,
    /// Platform of this host; derived from the OS when unset
    pub host_platform: Option<String>,
    pub install_group: Option<String>,
    /// Octal umask string such as `0002`
    pub install_umask: Option<String>,
    /// Require a reason for global installs
    pub ask_install_reason: bool,
    /// Require a clean working tree for global installs
    pub vcs_check: bool,
    /// Ask before starting file operations
    pub confirm_install: bool,
    pub hook_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tree: None,
            root_base: PathBuf::from(DEFAULT_ROOT_BASE),
            proxy_base: None,
            epoch: DEFAULT_EPOCH.to_string(),
            platforms: Vec::new(),
            host_platform: None,
            install_group: None,
            install_umask: None,
            ask_install_reason: true,
            vcs_check: true,
            confirm_install: false,
            hook_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from `$SITKIT_CONFIG` or the user config directory
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => match dirs::config_dir() {
                Some(dir) => dir.join("sitkit").join("config.toml"),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Proxy base directory, falling back to `$HOME/.HRI/sit`
    pub fn proxy_base(&self) -> Option<PathBuf> {
        self.proxy_base
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_PROXY_SUBDIR)))
    }

    /// Host platform name: environment, config, then `<os>64`/`<os>32`
    pub fn host_platform(&self, env: &Environment) -> String {
        if let Some(platform) = &env.platform {
            return platform.clone();
        }
        if let Some(platform) = &self.host_platform {
            return platform.clone();
        }
        let bits = if cfg!(target_pointer_width = "64") { "64" } else { "32" };
        format!("{}{}", std::env::consts::OS, bits)
    }

    /// Platforms to scan; just the host platform unless configured
    pub fn platforms(&self, env: &Environment) -> Vec<String> {
        if self.platforms.is_empty() {
            vec![self.host_platform(env)]
        } else {
            self.platforms.clone()
        }
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }
}

/// Environment overrides, captured once per process
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// `SIT`: explicit active tree
    pub sit: Option<PathBuf>,
    /// `SIT_VERSION`: tree epoch
    pub sit_version: Option<String>,
    /// `SIT_INSTALL_PREFIX`: force the root tree of an install
    pub install_prefix: Option<PathBuf>,
    /// `SIT_PATCHLEVEL`: pin the patchlevel of an install
    pub patchlevel: Option<u32>,
    /// `SIT_INSTALL_UMASK`
    pub install_umask: Option<String>,
    /// `SIT_INSTALL_GROUP`
    pub install_group: Option<String>,
    /// `SIT_INSTALL_REASON`: reason for global installs in batch mode
    pub install_reason: Option<String>,
    /// `SIT_SKIP_VCS_CHECK=TRUE`
    pub skip_vcs_check: bool,
    /// `SIT_SKIP_INSTALL_LOG=TRUE`
    pub skip_install_log: bool,
    /// `SIT_FAST_INSTALL=TRUE`: answer yes to every prompt
    pub fast_install: bool,
    /// `DRY_RUN=TRUE`
    pub dry_run: bool,
    /// `MAKEFILE_PLATFORM`
    pub platform: Option<String>,
}

impl Environment {
    pub fn capture() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let flag = |name: &str| non_empty(name).is_some_and(|v| v == "TRUE");

        let patchlevel = match non_empty("SIT_PATCHLEVEL") {
            Some(value) => Some(value.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("SIT_PATCHLEVEL must be a non-negative integer, got {:?}", value))
            })?),
            None => None,
        };

        Ok(Self {
            sit: non_empty("SIT").map(PathBuf::from),
            sit_version: non_empty("SIT_VERSION"),
            install_prefix: non_empty("SIT_INSTALL_PREFIX").map(PathBuf::from),
            patchlevel,
            install_umask: non_empty("SIT_INSTALL_UMASK"),
            install_group: non_empty("SIT_INSTALL_GROUP"),
            install_reason: non_empty("SIT_INSTALL_REASON"),
            skip_vcs_check: flag("SIT_SKIP_VCS_CHECK"),
            skip_install_log: flag("SIT_SKIP_INSTALL_LOG"),
            fast_install: flag("SIT_FAST_INSTALL"),
            dry_run: flag("DRY_RUN"),
            platform: non_empty("MAKEFILE_PLATFORM"),
        })
    }
}
