// src/install/hooks.rs

//! Install hooks
//!
//! Every stage has a startup and exit hook point, and Materialize adds three
//! more around the file operations. A hook is either a callback registered
//! by the caller or a package-local script `<source>/<HookName>.sh`. The
//! list of hooks is resolved once before the first stage runs; a point
//! without a hook stays `None` and is skipped.

use super::Stage;
use crate::error::{Error, Result};
use crate::process;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for hook scripts (5 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    OnStartup(Stage),
    OnExit(Stage),
    PreInstall,
    Install,
    PostInstall,
}

impl HookPoint {
    /// All hook points in execution order
    pub fn all() -> Vec<HookPoint> {
        let mut points = Vec::with_capacity(13);
        for stage in Stage::ALL {
            points.push(HookPoint::OnStartup(stage));
            if stage == Stage::Materialize {
                points.extend([HookPoint::PreInstall, HookPoint::Install, HookPoint::PostInstall]);
            }
            points.push(HookPoint::OnExit(stage));
        }
        points
    }

    /// Hook name, also the script file stem
    pub fn name(&self) -> String {
        match self {
            HookPoint::OnStartup(stage) => format!("onStartupStage{}", stage.number()),
            HookPoint::OnExit(stage) => format!("onExitStage{}", stage.number()),
            HookPoint::PreInstall => "preInstallHook".to_string(),
            HookPoint::Install => "installHook".to_string(),
            HookPoint::PostInstall => "postInstallHook".to_string(),
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Context passed to callbacks
#[derive(Debug, Clone)]
pub struct HookContext<'a> {
    pub point: HookPoint,
    pub source_dir: &'a Path,
    /// Absolute install root, once known
    pub install_root: Option<&'a Path>,
}

pub type HookCallback = Box<dyn Fn(&HookContext<'_>) -> Result<()>>;

pub enum Hook {
    Callback(HookCallback),
    Script(PathBuf),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Callback(_) => write!(f, "Callback"),
            Hook::Script(path) => write!(f, "Script({:?})", path),
        }
    }
}

/// Hooks resolved for one run, in execution order
#[derive(Debug)]
pub struct HookList {
    hooks: Vec<(HookPoint, Option<Hook>)>,
    timeout: Duration,
}

impl HookList {
    /// Pair every hook point with a registered callback or a script found
    /// in `source_dir`; callbacks take precedence
    pub fn resolve(
        source_dir: &Path,
        mut callbacks: Vec<(HookPoint, HookCallback)>,
        timeout: Duration,
    ) -> Self {
        let hooks = HookPoint::all()
            .into_iter()
            .map(|point| {
                let hook = match callbacks.iter().position(|(p, _)| *p == point) {
                    Some(pos) => Some(Hook::Callback(callbacks.swap_remove(pos).1)),
                    None => {
                        let script = source_dir.join(format!("{}.sh", point.name()));
                        script.is_file().then_some(Hook::Script(script))
                    }
                };
                if hook.is_some() {
                    debug!("Hook {} resolved", point);
                }
                (point, hook)
            })
            .collect();

        Self { hooks, timeout }
    }

    pub fn empty() -> Self {
        Self {
            hooks: HookPoint::all().into_iter().map(|p| (p, None)).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn get(&self, point: HookPoint) -> Option<&Hook> {
        self.hooks
            .iter()
            .find(|(p, _)| *p == point)
            .and_then(|(_, hook)| hook.as_ref())
    }

    pub fn points(&self) -> impl Iterator<Item = HookPoint> + '_ {
        self.hooks.iter().map(|(p, _)| *p)
    }

    /// Run the hook at `point`, if any
    pub fn run(&self, context: &HookContext<'_>) -> Result<()> {
        let Some(hook) = self.get(context.point) else {
            return Ok(());
        };

        match hook {
            Hook::Callback(callback) => {
                debug!("Entering {}()", context.point);
                callback(context)?;
                debug!("Returned from {}()", context.point);
                Ok(())
            }
            Hook::Script(path) => run_script(&context.point.name(), path, context, self.timeout),
        }
    }
}

fn run_script(name: &str, path: &Path, context: &HookContext<'_>, timeout: Duration) -> Result<()> {
    info!("Executing hook script: {}", path.display());

    let mut command = Command::new("/bin/sh");
    command
        .arg(path)
        .current_dir(context.source_dir)
        .env("SIT_HOOK", name)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(root) = context.install_root {
        command.env("SIT_INSTALL_ROOT", root);
    }

    let child = command.spawn().map_err(|e| Error::HookFailed {
        name: name.to_string(),
        reason: format!("failed to spawn {}: {}", path.display(), e),
    })?;

    let Some(captured) = process::wait_captured(child, timeout)? else {
        return Err(Error::HookFailed {
            name: name.to_string(),
            reason: format!("timed out after {} seconds", timeout.as_secs()),
        });
    };

    for line in captured.stdout.lines() {
        info!("[{}] {}", name, line);
    }
    for line in captured.stderr.lines() {
        warn!("[{}] {}", name, line);
    }

    if captured.status.success() {
        Ok(())
    } else {
        Err(Error::HookFailed {
            name: name.to_string(),
            reason: format!("exit code {}", captured.status.code().unwrap_or(-1)),
        })
    }
}
