// src/install/mod.rs

//! The install pipeline
//!
//! [`InstallEngine`] turns a source package into a tree entry (or a
//! tarball) in five fixed stages:
//!
//! 1. **MetaInfo**: identity, target tree, VCS check, install reason,
//!    patchlevel reservation, umask and group
//! 2. **Generate**: `install/BashSrc`, `install/pkgInfo.toml`, documentation
//! 3. **Scan**: build the [`InstallIndex`](index::InstallIndex)
//! 4. **Materialize**: copy, set permissions, update version symlinks
//! 5. **Cleanup**: remove temporary objects, release the patchlevel lock
//!
//! Any error aborts the remaining stages, but Cleanup always runs. The
//! [`Strategy`] decides where files go and which extra steps apply.

pub mod clean;
pub mod generate;
pub mod hooks;
pub mod index;
pub mod materialize;
pub mod permissions;
pub mod reason;
pub mod scan;
mod stage;
pub mod strategy;
pub mod vcs;

pub use stage::{Stage, StageTracker};
pub use strategy::Strategy;

use crate::config::{Config, Environment};
use crate::deps::{
    DependencyCache, DependencyResolver, PackageUrl, ResolveOptions, SystemPackageProbe, check_batch,
};
use crate::error::{Error, PermissionWarning, Result};
use crate::metadata::{InstallMode, PKGINFO_FILE, PkgInfo};
use crate::path::PackageIdentity;
use crate::patchlevel::{PatchlevelManager, Reservation, replace_symlink};
use crate::prompt::{AutoPrompt, Prompt};
use crate::tree::proxy::remove_path;
use crate::tree::{SitLocation, TreeResolver};
use chrono::Local;
use generate::{DocumentationGenerator, Generator, GeneratorContext, ShellStubGenerator};
use hooks::{HookCallback, HookContext, HookList, HookPoint};
use index::InstallIndex;
use permissions::PermissionSettings;
use reason::{InstallReason, LedgerEntry};
use scan::Scanner;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use vcs::VcsAdapter;

/// Attempts at entering a valid install reason interactively
const REASON_ATTEMPTS: usize = 3;

/// What an install run did
#[derive(Debug)]
pub struct InstallOutcome {
    pub identity: PackageIdentity,
    pub strategy: Strategy,
    /// Absolute install directory; `None` for tarball exports
    pub target: Option<PathBuf>,
    /// Written (or, in a dry run, would-be) destinations
    pub files: Vec<PathBuf>,
    pub warnings: Vec<PermissionWarning>,
    /// Generators that reported a failure
    pub failed_generators: Vec<String>,
    /// `Some(false)` when the current-version symlink update was declined
    pub symlink_updated: Option<bool>,
    pub archive: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub dry_run: bool,
}

/// Everything MetaInfo decided
#[derive(Debug)]
struct Plan {
    identity: PackageIdentity,
    info: PkgInfo,
    location: SitLocation,
    settings: PermissionSettings,
    reason: Option<InstallReason>,
    first_install: bool,
}

#[derive(Default)]
struct RunState {
    reservation: Option<Reservation>,
    staging: Option<TempDir>,
    install_root: Option<PathBuf>,
    index: InstallIndex,
    files: Vec<PathBuf>,
    warnings: Vec<PermissionWarning>,
    failed_generators: Vec<String>,
    symlink_updated: Option<bool>,
    archive: Option<PathBuf>,
    ledger: Option<PathBuf>,
}

impl RunState {
    fn staging_path(&self) -> Result<&Path> {
        self.staging
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| Error::Aborted("staging directory not created".to_string()))
    }
}

/// Installs one source package
pub struct InstallEngine<'a> {
    source_dir: PathBuf,
    strategy: Strategy,
    config: Config,
    env: Environment,
    prompt: &'a mut dyn Prompt,
    location: Option<SitLocation>,
    vcs: Option<Box<dyn VcsAdapter>>,
    generators: Option<Vec<Box<dyn Generator>>>,
    callbacks: Vec<(HookPoint, HookCallback)>,
    dry_run: bool,
}

impl<'a> InstallEngine<'a> {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        strategy: Strategy,
        config: Config,
        env: Environment,
        prompt: &'a mut dyn Prompt,
    ) -> Self {
        let source_dir = source_dir.into();
        let source_dir = fs::canonicalize(&source_dir).unwrap_or(source_dir);
        let dry_run = env.dry_run;
        Self {
            source_dir,
            strategy,
            config,
            env,
            prompt,
            location: None,
            vcs: None,
            generators: None,
            callbacks: Vec::new(),
            dry_run,
        }
    }

    /// Use `location` instead of resolving the active tree
    pub fn with_location(mut self, location: SitLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Use `adapter` instead of detecting the repository
    pub fn with_vcs(mut self, adapter: Box<dyn VcsAdapter>) -> Self {
        self.vcs = Some(adapter);
        self
    }

    /// Replace the default generators
    pub fn with_generators(mut self, generators: Vec<Box<dyn Generator>>) -> Self {
        self.generators = Some(generators);
        self
    }

    /// Register a callback; it takes precedence over a hook script
    pub fn with_hook(mut self, point: HookPoint, callback: HookCallback) -> Self {
        self.callbacks.push((point, callback));
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = self.dry_run || dry_run;
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Run all stages
    pub fn run(mut self) -> Result<InstallOutcome> {
        let callbacks = std::mem::take(&mut self.callbacks);
        let hooks = HookList::resolve(&self.source_dir, callbacks, self.config.hook_timeout());
        let mut tracker = StageTracker::new();
        let mut state = RunState::default();

        let result = self.run_stages(&hooks, &mut tracker, &mut state);
        if let Err(e) = &result {
            warn!("Install aborted: {}", e);
        }
        let cleanup = self.cleanup(&hooks, &mut tracker, &mut state);

        let plan = result?;
        cleanup?;

        let target = self
            .strategy
            .target_tree(&plan.location)
            .map(|tree| tree.join(plan.identity.install_path()));
        Ok(InstallOutcome {
            identity: plan.identity,
            strategy: self.strategy,
            target,
            files: state.files,
            warnings: state.warnings,
            failed_generators: state.failed_generators,
            symlink_updated: state.symlink_updated,
            archive: state.archive,
            ledger: state.ledger,
            dry_run: self.dry_run,
        })
    }

    fn run_stages(&mut self, hooks: &HookList, tracker: &mut StageTracker, state: &mut RunState) -> Result<Plan> {
        tracker.enter(Stage::MetaInfo)?;
        info!("Install {}", Stage::MetaInfo);
        self.run_hook(hooks, HookPoint::OnStartup(Stage::MetaInfo), None)?;
        let plan = self.meta_info(state)?;
        let install_root = state.install_root.clone();
        self.run_hook(hooks, HookPoint::OnExit(Stage::MetaInfo), install_root.as_deref())?;

        tracker.enter(Stage::Generate)?;
        info!("Install {}", Stage::Generate);
        self.run_hook(hooks, HookPoint::OnStartup(Stage::Generate), install_root.as_deref())?;
        self.generate(&plan, state);
        self.run_hook(hooks, HookPoint::OnExit(Stage::Generate), install_root.as_deref())?;

        tracker.enter(Stage::Scan)?;
        info!("Install {}", Stage::Scan);
        self.run_hook(hooks, HookPoint::OnStartup(Stage::Scan), install_root.as_deref())?;
        self.scan(&plan, state)?;
        self.run_hook(hooks, HookPoint::OnExit(Stage::Scan), install_root.as_deref())?;

        tracker.enter(Stage::Materialize)?;
        info!("Install {}", Stage::Materialize);
        self.run_hook(hooks, HookPoint::OnStartup(Stage::Materialize), install_root.as_deref())?;
        self.materialize(&plan, hooks, state)?;
        self.run_hook(hooks, HookPoint::OnExit(Stage::Materialize), install_root.as_deref())?;

        Ok(plan)
    }

    fn run_hook(&self, hooks: &HookList, point: HookPoint, install_root: Option<&Path>) -> Result<()> {
        hooks.run(&HookContext {
            point,
            source_dir: &self.source_dir,
            install_root,
        })
    }

    // Stage 1

    fn meta_info(&mut self, state: &mut RunState) -> Result<Plan> {
        clean::require_top_level_dir(&self.source_dir)?;
        let info = load_source_info(&self.source_dir)?;
        let mut identity = package_identity(&self.source_dir, &info)?;

        let location = self.resolve_location();
        self.strategy.validate(&location)?;
        info!(
            "{} install of {} into {:?}",
            self.strategy,
            identity,
            self.strategy.target_tree(&location).unwrap_or(self.source_dir.as_path())
        );

        if self.strategy.requires_vcs_check() {
            self.check_working_tree()?;
        }
        let reason = if self.strategy.requires_reason() {
            self.install_reason()?
        } else {
            None
        };

        let pin = self.env.patchlevel.or(info.patchlevel);
        if info.use_patchlevels || pin.is_some() {
            let tree = self
                .strategy
                .target_tree(&location)
                .unwrap_or(location.root_path.as_path());
            let manager = PatchlevelManager::new(tree, pin);
            let patchlevel = if self.dry_run || !self.strategy.mutates_tree() {
                manager.allocate(&identity)
            } else {
                let reservation = manager.reserve(&identity)?;
                let patchlevel = reservation.patchlevel;
                state.reservation = Some(reservation);
                patchlevel
            };
            info!("Using patchlevel {}", patchlevel);
            identity = identity.with_patchlevel(Some(patchlevel));
        }

        let first_install = fs::symlink_metadata(location.root_path.join(identity.canonical_path())).is_err();

        let mut settings = PermissionSettings::resolve(&self.env, &info, &self.config)?;
        if let Some(mask) = settings.umask {
            permissions::apply_process_umask(mask);
        }
        if let Some(group) = settings.group.clone()
            && permissions::lookup_group(&group).is_none()
        {
            let mut warning = PermissionWarning::new(format!("chgrp {} (no such group)", group));
            warning.record(self.source_dir.clone());
            warn!("{}", Error::PermissionDegraded(warning.clone()));
            state.warnings.push(warning);
            settings.group = None;
        }

        let staging = tempfile::Builder::new().prefix("sitkit-install-").tempdir()?;
        state.install_root = Some(match self.strategy.target_tree(&location) {
            Some(tree) => tree.join(identity.install_path()),
            None => staging.path().join("scratch").join(identity.install_path()),
        });
        state.staging = Some(staging);

        Ok(Plan {
            identity,
            info,
            location,
            settings,
            reason,
            first_install,
        })
    }

    fn resolve_location(&self) -> SitLocation {
        if let Some(location) = &self.location {
            return location.clone();
        }
        if let Some(prefix) = &self.env.install_prefix
            && self.strategy != Strategy::Proxy
        {
            debug!("SIT_INSTALL_PREFIX forces root {:?}", prefix);
            return SitLocation::root(prefix);
        }
        TreeResolver::from_config(&self.config, &self.env).resolve_active_tree()
    }

    fn check_working_tree(&mut self) -> Result<()> {
        if self.env.skip_vcs_check || !self.config.vcs_check {
            info!("Skipping version control check");
            return Ok(());
        }

        let adapter = match self.vcs.take() {
            Some(adapter) => Some(adapter),
            None => vcs::detect(&self.source_dir, self.config.hook_timeout(), &generate::GENERATED_FILES),
        };
        let Some(adapter) = adapter else {
            warn!(
                "{} is not under version control, unable to check for uncommitted changes",
                self.source_dir.display()
            );
            return Ok(());
        };

        match adapter.consistency_check()? {
            Some(report) => Err(Error::DirtyWorkingTree(report)),
            None => {
                debug!("{} working tree is clean", adapter.name());
                Ok(())
            }
        }
    }

    fn install_reason(&mut self) -> Result<Option<InstallReason>> {
        if self.env.skip_install_log || !self.config.ask_install_reason {
            debug!("Not asking for an install reason");
            return Ok(None);
        }
        if let Some(text) = &self.env.install_reason {
            return InstallReason::parse(text).map(Some);
        }

        for _ in 0..REASON_ATTEMPTS {
            let Some(text) = self.prompt.read_line(
                "Please give a reason for this global install (TYPE: description, TYPE one of DOC, FIX, IMP, NEW): ",
            ) else {
                break;
            };
            match InstallReason::parse(&text) {
                Ok(reason) => return Ok(Some(reason)),
                Err(e) => warn!("{}", e),
            }
        }
        Err(Error::Aborted("no valid install reason given".to_string()))
    }

    // Stage 2

    fn generate(&mut self, plan: &Plan, state: &mut RunState) {
        let generators = self
            .generators
            .take()
            .unwrap_or_else(|| default_generators(&self.strategy));
        let ctx = GeneratorContext {
            source_dir: &self.source_dir,
            identity: &plan.identity,
            info: &plan.info,
        };

        for generator in generators {
            match generator.generate(&ctx) {
                Ok(output) if output.success => debug!("{} generator finished", generator.name()),
                Ok(output) => {
                    warn!("Unable to create {}: {}", generator.name(), output.output.trim());
                    state.failed_generators.push(generator.name().to_string());
                }
                Err(e) => {
                    warn!("Unable to create {}: {}", generator.name(), e);
                    state.failed_generators.push(generator.name().to_string());
                }
            }
        }
    }

    // Stage 3

    fn scan(&self, plan: &Plan, state: &mut RunState) -> Result<()> {
        let links_dir = state.staging_path()?.join("links");
        let mut scanner = Scanner::new(
            &self.source_dir,
            plan.identity.install_path(),
            self.config.platforms(&self.env),
            links_dir,
        );

        let result = scanner.scan(&plan.info).and_then(|()| {
            if matches!(self.strategy, Strategy::Tar { .. }) && plan.identity.patchlevel.is_some() {
                scanner.link_in_tree(&plan.identity.install_dir_name(), &plan.identity.canonical_path())
            } else {
                Ok(())
            }
        });
        state.index = scanner.into_index();
        result
    }

    // Stage 4

    fn materialize(&mut self, plan: &Plan, hooks: &HookList, state: &mut RunState) -> Result<()> {
        let install_root = state.install_root.clone();

        if self.strategy.asks_confirmation() && self.config.confirm_install && !self.env.fast_install {
            let question = format!("Install {} ({} files)?", plan.identity.install_path(), state.index.len());
            if !self.prompt.confirm(&question, true) {
                return Err(Error::Aborted("install declined".to_string()));
            }
        }

        self.run_hook(hooks, HookPoint::PreInstall, install_root.as_deref())?;
        self.pre_install(plan)?;

        self.run_hook(hooks, HookPoint::Install, install_root.as_deref())?;
        match self.strategy.target_tree(&plan.location) {
            Some(tree) => {
                let tree = tree.to_path_buf();
                state.files = materialize::install_worker(&state.index, &self.source_dir, &tree, self.dry_run)?;
                if !self.dry_run {
                    let dir = tree.join(plan.identity.install_path());
                    state.warnings.extend(permissions::apply(&dir, &plan.settings));
                }
            }
            None => {
                let scratch = state.staging_path()?.join("scratch");
                state.files = materialize::install_worker(&state.index, &self.source_dir, &scratch, self.dry_run)?;
                let archive = self
                    .strategy
                    .archive_path(&self.source_dir, &plan.identity)
                    .ok_or_else(|| Error::Aborted("no archive path".to_string()))?;
                if self.dry_run {
                    info!("[DRY-RUN] Would write {:?}", archive);
                } else {
                    state.warnings.extend(permissions::apply(&scratch, &plan.settings));
                    materialize::write_archive(&state.index, &scratch, &archive)?;
                    state.archive = Some(archive);
                }
            }
        }

        self.post_install(plan, state)?;
        self.run_hook(hooks, HookPoint::PostInstall, install_root.as_deref())
    }

    fn pre_install(&self, plan: &Plan) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let clean = plan.info.install_mode == InstallMode::Clean;

        match &self.strategy {
            Strategy::Global if clean => {
                info!("Clean install: removing {} first", plan.identity);
                clean::uninstall(&plan.identity, &plan.location, true, false)?;
            }
            Strategy::Proxy => {
                if clean {
                    info!("Clean install: removing {} from proxy first", plan.identity);
                    clean::uninstall(&plan.identity, &plan.location, false, false)?;
                }
                // a link into the root must not be written through
                if let Some(proxy) = &plan.location.proxy_path {
                    let path = proxy.join(plan.identity.install_path());
                    if fs::symlink_metadata(&path).is_ok_and(|m| m.file_type().is_symlink()) {
                        info!("Removing symlink {:?}", path);
                        remove_path(&path)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn post_install(&mut self, plan: &Plan, state: &mut RunState) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let identity = &plan.identity;

        match &self.strategy {
            Strategy::Global => {
                let manager = PatchlevelManager::new(&plan.location.root_path, None);
                if let Some(patchlevel) = identity.patchlevel {
                    let updated = if self.env.fast_install {
                        manager.update_current_symlink(identity, patchlevel, &mut AutoPrompt::yes())?
                    } else {
                        manager.update_current_symlink(identity, patchlevel, &mut *self.prompt)?
                    };
                    state.symlink_updated = Some(updated);
                }
                manager.propagate_to_proxy(identity, identity.patchlevel, &plan.location)?;

                if let Some(reason) = &plan.reason {
                    let now = Local::now();
                    let entry = LedgerEntry::new(identity, reason, plan.first_install, now);
                    state.ledger = reason::write_ledger_entry(&plan.location.root_path, &entry, now);
                }
            }
            Strategy::Proxy => {
                if let (Some(proxy), Some(_)) = (&plan.location.proxy_path, identity.patchlevel) {
                    let link = proxy.join(identity.canonical_path());
                    info!("Linking {:?} -> {}", link, identity.install_dir_name());
                    replace_symlink(Path::new(&identity.install_dir_name()), &link)?;
                    state.symlink_updated = Some(true);
                }
            }
            Strategy::Tar { .. } => {}
        }
        Ok(())
    }

    // Stage 5

    fn cleanup(&self, hooks: &HookList, tracker: &mut StageTracker, state: &mut RunState) -> Result<()> {
        tracker.enter_cleanup()?;
        info!("Install {}", Stage::Cleanup);
        let install_root = state.install_root.clone();
        let startup = self.run_hook(hooks, HookPoint::OnStartup(Stage::Cleanup), install_root.as_deref());

        let removed = state.index.remove_temp_objects();
        debug!("Removed {} temporary objects", removed);

        if let Some(staging) = state.staging.take() {
            let path = staging.path().to_path_buf();
            if let Err(e) = staging.close() {
                warn!("Unable to remove {:?}: {}", path, e);
            }
        }
        if let Some(reservation) = state.reservation.take()
            && let Err(e) = reservation.release()
        {
            warn!("{}", e);
        }

        let exit = self.run_hook(hooks, HookPoint::OnExit(Stage::Cleanup), install_root.as_deref());
        startup.and(exit)
    }
}

/// Generators used unless replaced with [`InstallEngine::with_generators`]
pub fn default_generators(strategy: &Strategy) -> Vec<Box<dyn Generator>> {
    let mut generators: Vec<Box<dyn Generator>> = vec![Box::new(ShellStubGenerator)];
    if strategy.builds_documentation() {
        generators.push(Box::new(DocumentationGenerator));
    }
    generators
}

/// `<source>/pkgInfo.toml`, or defaults if the package has none
pub fn load_source_info(source_dir: &Path) -> Result<PkgInfo> {
    if source_dir.join(PKGINFO_FILE).exists() {
        PkgInfo::load(source_dir)
    } else {
        debug!("No {} in {:?}, using defaults", PKGINFO_FILE, source_dir);
        Ok(PkgInfo::default())
    }
}

/// Identity of a source package
///
/// `name` and `version` fall back to the directory layout
/// `.../<name>/<version>`; `category` must be set in the metadata.
pub fn package_identity(source_dir: &Path, info: &PkgInfo) -> Result<PackageIdentity> {
    let dir = fs::canonicalize(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());
    let file_name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned());

    let version = info
        .version
        .clone()
        .or_else(|| file_name(&dir))
        .ok_or_else(|| Error::NotFound(format!("package version of {}", dir.display())))?;
    let name = info
        .name
        .clone()
        .or_else(|| dir.parent().and_then(file_name))
        .ok_or_else(|| Error::NotFound(format!("package name of {}", dir.display())))?;
    let category = info.category.clone().ok_or_else(|| {
        Error::NotFound(format!(
            "package category of {}: set `category` in {}",
            dir.display(),
            PKGINFO_FILE
        ))
    })?;
    if Path::new(&category).is_absolute() {
        return Err(Error::NotCanonicalPath(format!("{}/{}/{}", category, name, version)));
    }

    PackageIdentity::new(&category, &name, &version)
}

/// Check source packages about to be installed together
///
/// Each package's closure is computed from its source metadata and the
/// tree; the whole batch is rejected with
/// [`DependencyConflict`](Error::DependencyConflict) if any two packages
/// need different versions of the same dependency.
pub fn check_batch_sources(
    sources: &[PathBuf],
    tree: &Path,
    probe: &dyn SystemPackageProbe,
) -> Result<Vec<PackageIdentity>> {
    let resolver = DependencyResolver::new(tree, probe);
    let mut cache = DependencyCache::new();
    let mut urls = Vec::with_capacity(sources.len());
    let mut identities = Vec::with_capacity(sources.len());

    for source in sources {
        let info = load_source_info(source)?;
        let identity = package_identity(source, &info)?;
        let url = PackageUrl::sit(&identity.canonical_path());
        let depends = info
            .depends
            .iter()
            .map(|d| PackageUrl::parse(d))
            .collect::<Result<Vec<_>>>()?;
        cache.seed(&url, false, depends);
        urls.push(url);
        identities.push(identity);
    }

    // batch members need not be installed yet
    let options = ResolveOptions {
        recursive: true,
        ignore_errors: true,
        ..ResolveOptions::default()
    };
    let closures = resolver.closure_map(&urls, &options, &mut cache)?;
    check_batch(&closures)?;
    info!("No dependency conflicts among {} packages", sources.len());
    Ok(identities)
}
