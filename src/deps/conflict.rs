// src/deps/conflict.rs

//! Version conflicts between packages of one batch
//!
//! Two packages conflict when their dependency closures (each including the
//! package itself) contain different versions of the same `category/name`.

use super::PackageUrl;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Two packages requiring different versions of one dependency
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConflictReport {
    /// `category/name` of the contested package
    pub dependency: String,
    /// (requiring package, version it needs)
    pub first: (PackageUrl, String),
    pub second: (PackageUrl, String),
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} requires {}, {} requires {}",
            self.dependency, self.first.0, self.first.1, self.second.0, self.second.1
        )
    }
}

/// Find every conflicting pair in `closures` (package -> flat dependency set)
///
/// The result does not depend on map order; each unordered package pair is
/// reported once per contested dependency.
pub fn detect_conflicts(closures: &BTreeMap<PackageUrl, Vec<PackageUrl>>) -> Vec<ConflictReport> {
    // package -> (category/name -> versions)
    let versions: Vec<(&PackageUrl, BTreeMap<String, BTreeSet<String>>)> = closures
        .iter()
        .map(|(package, deps)| {
            let mut by_key: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for url in std::iter::once(package).chain(deps.iter()) {
                if let Some(id) = url.identity() {
                    by_key.entry(id.package_key()).or_default().insert(id.version);
                }
            }
            (package, by_key)
        })
        .collect();

    let mut reports = BTreeSet::new();
    for (i, (a, a_versions)) in versions.iter().enumerate() {
        for (b, b_versions) in &versions[i + 1..] {
            for (key, a_set) in a_versions {
                let Some(b_set) = b_versions.get(key) else {
                    continue;
                };
                for va in a_set {
                    for vb in b_set {
                        if va != vb {
                            reports.insert(ConflictReport {
                                dependency: key.clone(),
                                first: ((*a).clone(), va.clone()),
                                second: ((*b).clone(), vb.clone()),
                            });
                        }
                    }
                }
            }
        }
    }

    reports.into_iter().collect()
}

/// Reject a batch whose packages disagree on dependency versions
pub fn check_batch(closures: &BTreeMap<PackageUrl, Vec<PackageUrl>>) -> Result<()> {
    let reports = detect_conflicts(closures);
    if reports.is_empty() {
        Ok(())
    } else {
        Err(Error::DependencyConflict(reports))
    }
}
