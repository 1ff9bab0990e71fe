// src/install/generate.rs

//! Generated artifacts
//!
//! Before scanning, generators write files into the source tree that every
//! installed package carries: the shell environment stub (`install/BashSrc`)
//! and the normalized metadata copy (`install/pkgInfo.toml`). A hand-written
//! `install/BashSrc` is kept as is. Documentation is built when doxygen is
//! available.

use crate::deps::PackageUrl;
use crate::error::Result;
use crate::metadata::PkgInfo;
use crate::path::{PackageIdentity, SIT_TOKEN};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Files written by [`ShellStubGenerator`], relative to the package
pub const GENERATED_FILES: [&str; 2] = ["install/BashSrc", "install/pkgInfo.toml"];

/// What a generator sees
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub source_dir: &'a Path,
    pub identity: &'a PackageIdentity,
    pub info: &'a PkgInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOutput {
    pub success: bool,
    pub output: String,
}

impl GeneratorOutput {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Produces files in the source tree ahead of the scan
pub trait Generator {
    fn name(&self) -> &str;
    fn generate(&self, ctx: &GeneratorContext<'_>) -> Result<GeneratorOutput>;
}

/// Writes `install/BashSrc` and `install/pkgInfo.toml`
#[derive(Debug, Default)]
pub struct ShellStubGenerator;

impl ShellStubGenerator {
    /// Environment stub sourcing the dependencies' stubs first
    pub fn bash_src(identity: &PackageIdentity, info: &PkgInfo, source_dir: &Path) -> String {
        let root = format!("{}/{}", SIT_TOKEN, identity.canonical_path());
        let mut out = String::new();
        out.push_str("#!/bin/bash\n#\n");
        out.push_str(&format!("# environment of {}, generated by sitkit\n#\n\n", identity));

        for dep in &info.depends {
            if let Ok(url) = PackageUrl::parse(dep)
                && !url.is_system()
            {
                out.push_str(&format!("source \"{}/{}/BashSrc\"\n", SIT_TOKEN, url.path));
            }
        }
        if !info.depends.is_empty() {
            out.push('\n');
        }

        if source_dir.join("bin").is_dir() {
            out.push_str(&format!(
                "export PATH=\"{root}/bin:{root}/bin/${{MAKEFILE_PLATFORM}}:${{PATH}}\"\n"
            ));
        }
        if source_dir.join("lib").is_dir() {
            out.push_str(&format!(
                "export LD_LIBRARY_PATH=\"{root}/lib/${{MAKEFILE_PLATFORM}}:${{LD_LIBRARY_PATH}}\"\n"
            ));
        }
        if source_dir.join("pymodules").is_dir() {
            out.push_str(&format!("export PYTHONPATH=\"{root}/pymodules:${{PYTHONPATH}}\"\n"));
        }
        out
    }
}

impl Generator for ShellStubGenerator {
    fn name(&self) -> &str {
        "shell stub"
    }

    fn generate(&self, ctx: &GeneratorContext<'_>) -> Result<GeneratorOutput> {
        let install_dir = ctx.source_dir.join("install");
        fs::create_dir_all(&install_dir)?;

        let bash_src_path = install_dir.join("BashSrc");
        if bash_src_path.exists() {
            debug!("Keeping existing {:?}", bash_src_path);
        } else {
            fs::write(&bash_src_path, Self::bash_src(ctx.identity, ctx.info, ctx.source_dir))?;
        }

        let mut info = ctx.info.clone();
        info.name = Some(ctx.identity.name.clone());
        info.version = Some(ctx.identity.version.clone());
        info.category = Some(ctx.identity.category.clone());
        fs::write(install_dir.join("pkgInfo.toml"), info.to_toml()?)?;

        info!("Generated {}", GENERATED_FILES.join(", "));
        Ok(GeneratorOutput::ok(GENERATED_FILES.join(" ")))
    }
}

/// Runs doxygen on `doc/Doxyfile` when both exist
#[derive(Debug, Default)]
pub struct DocumentationGenerator;

impl Generator for DocumentationGenerator {
    fn name(&self) -> &str {
        "documentation"
    }

    fn generate(&self, ctx: &GeneratorContext<'_>) -> Result<GeneratorOutput> {
        let doc_dir = ctx.source_dir.join("doc");
        if !doc_dir.join("Doxyfile").is_file() {
            debug!("No doc/Doxyfile, skipping documentation");
            return Ok(GeneratorOutput::ok("no doc/Doxyfile"));
        }

        let doxygen = match which::which("doxygen") {
            Ok(path) => path,
            Err(_) => return Ok(GeneratorOutput::failed("doxygen not found in PATH")),
        };

        info!("Creating documentation with {}", doxygen.display());
        let output = Command::new(doxygen)
            .arg("Doxyfile")
            .current_dir(&doc_dir)
            .stdin(Stdio::null())
            .output()?;

        let text = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(GeneratorOutput::ok(text))
        } else {
            Ok(GeneratorOutput::failed(text))
        }
    }
}
