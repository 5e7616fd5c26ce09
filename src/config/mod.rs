//! # Project Configuration
//!
//! Turns what the user asked for into a fully populated, validated
//! [`ResolvedConfiguration`].
//!
//! ## Flow
//!
//! ```text
//! tiergen.toml / CLI flags → ProjectConfiguration → ConfigResolver → ResolvedConfiguration
//! ```
//!
//! 1. **ProjectConfiguration** - name, module path, tier and a sparse set of
//!    feature overrides (only the flags the user touched)
//! 2. **ConfigResolver** - starts from the tier defaults, applies overrides in
//!    flag-name order, then applies derived constraints until nothing changes
//! 3. **ResolvedConfiguration** - every feature decided, immutable, consumed by
//!    the template repository and render engine
//!
//! Resolution reports *every* violated constraint at once, see
//! [`ConfigValidationError`].

mod file;
mod resolve;
#[cfg(test)]
mod tests;

pub use file::{find_project_file, load_project_file, ProjectFile, PROJECT_FILE_NAMES};
pub use resolve::{ConfigResolver, ConfigValidationError, Violation};

use crate::tier::{DependencyChecks, Feature, ProbeSettings, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Sparse feature overrides.
///
/// Known flags are kept typed; names that match no [`Feature`] are kept
/// verbatim so the resolver can report them alongside every other violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, bool>", into = "BTreeMap<String, bool>")]
pub struct FeatureOverrides {
    known: BTreeMap<Feature, bool>,
    unknown: BTreeSet<String>,
}

impl FeatureOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a typed override.
    pub fn set(&mut self, feature: Feature, enabled: bool) -> &mut Self {
        self.known.insert(feature, enabled);
        self
    }

    /// Set an override by flag name; unknown names are remembered, not dropped.
    pub fn set_named(&mut self, name: &str, enabled: bool) -> &mut Self {
        match name.parse::<Feature>() {
            Ok(feature) => {
                self.known.insert(feature, enabled);
            }
            Err(_) => {
                self.unknown.insert(name.trim().to_string());
            }
        }
        self
    }

    pub fn with(mut self, feature: Feature, enabled: bool) -> Self {
        self.set(feature, enabled);
        self
    }

    pub fn get(&self, feature: Feature) -> Option<bool> {
        self.known.get(&feature).copied()
    }

    /// Overrides in flag-name order.
    pub fn iter(&self) -> impl Iterator<Item = (Feature, bool)> + '_ {
        self.known.iter().map(|(f, on)| (*f, *on))
    }

    pub fn unknown(&self) -> impl Iterator<Item = &str> {
        self.unknown.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unknown.is_empty()
    }

    /// Layer `other` on top of `self`; `other` wins on overlap.
    pub fn merged(&self, other: &FeatureOverrides) -> FeatureOverrides {
        let mut merged = self.clone();
        merged.known.extend(other.known.iter().map(|(f, on)| (*f, *on)));
        merged.unknown.extend(other.unknown.iter().cloned());
        merged
    }

    /// Same overrides without the unrecognised names.
    pub fn known_only(&self) -> FeatureOverrides {
        FeatureOverrides {
            known: self.known.clone(),
            unknown: BTreeSet::new(),
        }
    }
}

impl From<BTreeMap<String, bool>> for FeatureOverrides {
    fn from(map: BTreeMap<String, bool>) -> Self {
        let mut overrides = FeatureOverrides::default();
        for (name, enabled) in map {
            overrides.set_named(&name, enabled);
        }
        overrides
    }
}

impl From<FeatureOverrides> for BTreeMap<String, bool> {
    fn from(overrides: FeatureOverrides) -> Self {
        overrides
            .known
            .into_iter()
            .map(|(f, on)| (f.as_str().to_string(), on))
            .collect()
    }
}

/// Values substituted into templates that are not feature flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Port the generated service listens on
    pub port: u16,
    /// Go toolchain version written into go.mod and the Dockerfile
    pub go_version: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            go_version: "1.22".to_string(),
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfiguration {
    pub name: String,
    /// Go module path, e.g. `example.com/svc`
    pub module: String,
    pub tier: Tier,
    pub overrides: FeatureOverrides,
    /// Defaults to `name` when unset
    pub output: Option<PathBuf>,
    pub settings: ProjectSettings,
}

impl ProjectConfiguration {
    pub fn new(name: impl Into<String>, module: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            tier,
            overrides: FeatureOverrides::default(),
            output: None,
            settings: ProjectSettings::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_override(mut self, feature: Feature, enabled: bool) -> Self {
        self.overrides.set(feature, enabled);
        self
    }

    /// Output directory, falling back to the project name.
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name))
    }
}

/// A configuration with every feature decided and every constraint satisfied.
///
/// Only [`ConfigResolver`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfiguration {
    name: String,
    module: String,
    tier: Tier,
    output: PathBuf,
    features: BTreeMap<Feature, bool>,
    overrides: FeatureOverrides,
    dependency_checks: DependencyChecks,
    probes: Option<ProbeSettings>,
    settings: ProjectSettings,
}

impl ResolvedConfiguration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Every feature, in name order.
    pub fn features(&self) -> &BTreeMap<Feature, bool> {
        &self.features
    }

    pub fn enabled(&self, feature: Feature) -> bool {
        self.features.get(&feature).copied().unwrap_or(false)
    }

    pub fn enabled_features(&self) -> Vec<Feature> {
        self.features
            .iter()
            .filter(|(_, on)| **on)
            .map(|(f, _)| *f)
            .collect()
    }

    /// The explicit overrides this configuration was resolved from.
    pub fn overrides(&self) -> &FeatureOverrides {
        &self.overrides
    }

    pub fn dependency_checks(&self) -> DependencyChecks {
        self.dependency_checks
    }

    pub fn probes(&self) -> Option<&ProbeSettings> {
        self.probes.as_ref()
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }
}
