// src/install/stage.rs

//! Install pipeline stages
//!
//! Stages run strictly in order. [`StageTracker`] enforces that: entering a
//! stage out of order or a second time is an error. Cleanup is the one
//! exception and may be entered from anywhere, so it also runs after a
//! failed stage.

use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Stage 1: identity, target tree, patchlevel, preconditions
    MetaInfo,
    /// Stage 2: generated files
    Generate,
    /// Stage 3: build the install index
    Scan,
    /// Stage 4: file operations
    Materialize,
    /// Stage 5: remove temporary objects, release locks
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::MetaInfo,
        Stage::Generate,
        Stage::Scan,
        Stage::Materialize,
        Stage::Cleanup,
    ];

    /// 1-based stage number, as used in hook names
    pub fn number(&self) -> u8 {
        match self {
            Self::MetaInfo => 1,
            Self::Generate => 2,
            Self::Scan => 3,
            Self::Materialize => 4,
            Self::Cleanup => 5,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::MetaInfo => Some(Self::Generate),
            Self::Generate => Some(Self::Scan),
            Self::Scan => Some(Self::Materialize),
            Self::Materialize => Some(Self::Cleanup),
            Self::Cleanup => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MetaInfo => "collecting meta info",
            Self::Generate => "generating files",
            Self::Scan => "scanning content",
            Self::Materialize => "installing",
            Self::Cleanup => "cleaning up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.name())
    }
}

/// Tracks the current stage of one run
#[derive(Debug, Default)]
pub struct StageTracker {
    current: Option<Stage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Stage> {
        self.current
    }

    /// Enter `stage`, which must directly follow the current one
    pub fn enter(&mut self, stage: Stage) -> Result<()> {
        let expected = match self.current {
            None => Some(Stage::MetaInfo),
            Some(current) => current.next(),
        };
        if expected != Some(stage) {
            return Err(Error::Aborted(format!(
                "cannot enter {} after {}",
                stage,
                self.current.map_or_else(|| "start".to_string(), |s| s.to_string())
            )));
        }
        self.current = Some(stage);
        Ok(())
    }

    /// Enter Cleanup from any stage, but only once
    pub fn enter_cleanup(&mut self) -> Result<()> {
        if self.current == Some(Stage::Cleanup) {
            return Err(Error::Aborted(format!("{} entered twice", Stage::Cleanup)));
        }
        self.current = Some(Stage::Cleanup);
        Ok(())
    }
}
