use super::{FeatureOverrides, ProjectConfiguration, ResolvedConfiguration};
use crate::tier::{Feature, ProbeSettings, Tier, TierDefinitionTable};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// `trigger ⇒ implied`: enabling the first forces the second on.
const IMPLICATIONS: &[(Feature, Feature)] = &[
    (Feature::Compliance, Feature::Security),
    (Feature::Compliance, Feature::Logging),
    (Feature::KubernetesManifests, Feature::Docker),
    (Feature::KubernetesManifests, Feature::HealthChecks),
    (Feature::MultiTenancy, Feature::Security),
    (Feature::Tracing, Feature::Logging),
    (Feature::TypescriptClient, Feature::OpenApi),
];

/// Upper bound on constraint passes. The rule set is acyclic, so it settles well before this.
const MAX_PASSES: usize = 8;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]*$").expect("project name regex should be valid")
});

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Error)]
pub enum Violation {
    #[error("project name is empty")]
    EmptyName,
    #[error("project name `{0}` must start with a lowercase letter and contain only a-z, 0-9, `-` or `_`")]
    InvalidName(String),
    #[error("module path is empty")]
    EmptyModule,
    #[error("module path `{0}` must not contain whitespace or leading/trailing `/`")]
    InvalidModule(String),
    #[error("unknown feature flag `{0}`")]
    UnknownFeature(String),
    #[error("feature `{feature}` is not available on tier `{tier}` (requires `{required}` or higher)")]
    FeatureUnavailable {
        feature: Feature,
        tier: Tier,
        required: Tier,
    },
    #[error("feature `{feature}` is explicitly disabled but `{required_by}` requires it")]
    RequiredFeatureDisabled {
        feature: Feature,
        required_by: Feature,
    },
    #[error("cannot migrate from tier `{from}` down to `{to}`")]
    Downgrade { from: Tier, to: Tier },
    #[error("derived feature constraints did not settle after {0} passes")]
    ConstraintsDiverged(usize),
}

impl Violation {
    /// The flag or field at fault.
    pub fn subject(&self) -> String {
        match self {
            Violation::EmptyName | Violation::InvalidName(_) => "name".to_string(),
            Violation::EmptyModule | Violation::InvalidModule(_) => "module".to_string(),
            Violation::UnknownFeature(name) => name.clone(),
            Violation::FeatureUnavailable { feature, .. }
            | Violation::RequiredFeatureDisabled { feature, .. } => feature.to_string(),
            Violation::Downgrade { .. } => "tier".to_string(),
            Violation::ConstraintsDiverged(_) => "features".to_string(),
        }
    }

    /// How to fix it.
    pub fn hint(&self) -> String {
        match self {
            Violation::EmptyName => "pass --name <name>".to_string(),
            Violation::InvalidName(_) => "use a name like `orders-api`".to_string(),
            Violation::EmptyModule => "pass --module <path>, e.g. example.com/svc".to_string(),
            Violation::InvalidModule(_) => "use a module path like `example.com/svc`".to_string(),
            Violation::UnknownFeature(_) => format!(
                "valid flags are: {}",
                Feature::ALL
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Violation::FeatureUnavailable { required, .. } => {
                format!("choose --tier {required} or drop the flag")
            }
            Violation::RequiredFeatureDisabled {
                feature,
                required_by,
            } => format!("remove --disable {feature} or also disable {required_by}"),
            Violation::Downgrade { from, .. } => {
                format!("pick a tier of {from} or higher")
            }
            Violation::ConstraintsDiverged(_) => "please report this as a bug".to_string(),
        }
    }
}

/// Every violation found while resolving a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ConfigValidationError {
    violations: Vec<Violation>,
}

impl ConfigValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid project configuration ({} violation(s))",
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {}: {}", violation.subject(), violation)?;
        }
        Ok(())
    }
}

/// Merges a [`ProjectConfiguration`] with the tier defaults.
#[derive(Debug, Clone, Copy)]
pub struct ConfigResolver<'t> {
    table: &'t TierDefinitionTable,
}

impl<'t> ConfigResolver<'t> {
    pub fn new(table: &'t TierDefinitionTable) -> Self {
        Self { table }
    }

    /// Resolve a configuration for a fresh generation.
    pub fn resolve(
        &self,
        config: &ProjectConfiguration,
    ) -> Result<ResolvedConfiguration, ConfigValidationError> {
        self.resolve_inner(config, None)
    }

    /// Resolve a configuration for a project currently generated at `recorded`.
    ///
    /// Same as [`resolve`](Self::resolve) plus a check that the tier does not go down.
    pub fn resolve_for_migration(
        &self,
        config: &ProjectConfiguration,
        recorded: Tier,
    ) -> Result<ResolvedConfiguration, ConfigValidationError> {
        self.resolve_inner(config, Some(recorded))
    }

    fn resolve_inner(
        &self,
        config: &ProjectConfiguration,
        recorded: Option<Tier>,
    ) -> Result<ResolvedConfiguration, ConfigValidationError> {
        let mut violations = BTreeSet::new();

        check_identity(config, &mut violations);
        if let Some(from) = recorded {
            if config.tier < from {
                violations.insert(Violation::Downgrade {
                    from,
                    to: config.tier,
                });
            }
        }
        for name in config.overrides.unknown() {
            violations.insert(Violation::UnknownFeature(name.to_string()));
        }

        let defaults = self.table.get(config.tier);
        let mut features = defaults.features.clone();
        let mut probes = defaults.probes.clone();

        // BTreeMap iteration is flag-name order, see `Feature`.
        for (feature, enabled) in config.overrides.iter() {
            if enabled && feature.available_from() > config.tier {
                violations.insert(Violation::FeatureUnavailable {
                    feature,
                    tier: config.tier,
                    required: feature.available_from(),
                });
            }
            features.insert(feature, enabled);
        }

        let settled = apply_implications(
            &mut features,
            &mut probes,
            &config.overrides,
            &mut violations,
        );
        if !settled {
            violations.insert(Violation::ConstraintsDiverged(MAX_PASSES));
        }

        if !violations.is_empty() {
            return Err(ConfigValidationError::new(violations.into_iter().collect()));
        }

        let on = |f: Feature| features.get(&f).copied().unwrap_or(false);
        let mut dependency_checks = defaults.dependency_checks;
        dependency_checks.database &= on(Feature::Database);
        dependency_checks.cache &= on(Feature::Caching);
        dependency_checks.audit_sink &= on(Feature::Compliance);

        debug!(
            tier = %config.tier,
            enabled = ?features.iter().filter(|(_, on)| **on).map(|(f, _)| f.as_str()).collect::<Vec<_>>(),
            "resolved project configuration"
        );

        Ok(ResolvedConfiguration {
            name: config.name.clone(),
            module: config.module.clone(),
            tier: config.tier,
            output: config.output_dir(),
            features,
            overrides: config.overrides.known_only(),
            dependency_checks,
            probes,
            settings: config.settings.clone(),
        })
    }
}

fn check_identity(config: &ProjectConfiguration, violations: &mut BTreeSet<Violation>) {
    let name = config.name.trim();
    if name.is_empty() {
        violations.insert(Violation::EmptyName);
    } else if !NAME_RE.is_match(name) {
        violations.insert(Violation::InvalidName(config.name.clone()));
    }

    let module = config.module.trim();
    if module.is_empty() {
        violations.insert(Violation::EmptyModule);
    } else if module.chars().any(char::is_whitespace)
        || module.starts_with('/')
        || module.ends_with('/')
    {
        violations.insert(Violation::InvalidModule(config.module.clone()));
    }
}

/// Apply [`IMPLICATIONS`] until nothing changes. Returns false if the pass limit was hit.
fn apply_implications(
    features: &mut BTreeMap<Feature, bool>,
    probes: &mut Option<ProbeSettings>,
    overrides: &FeatureOverrides,
    violations: &mut BTreeSet<Violation>,
) -> bool {
    for _ in 0..MAX_PASSES {
        let mut changed = false;

        for &(trigger, implied) in IMPLICATIONS {
            let triggered = features.get(&trigger).copied().unwrap_or(false);
            let present = features.get(&implied).copied().unwrap_or(false);
            if !triggered || present {
                continue;
            }
            if overrides.get(implied) == Some(false) {
                violations.insert(Violation::RequiredFeatureDisabled {
                    feature: implied,
                    required_by: trigger,
                });
                continue;
            }
            debug!(%trigger, %implied, "enabling implied feature");
            features.insert(implied, true);
            changed = true;
        }

        if features
            .get(&Feature::KubernetesManifests)
            .copied()
            .unwrap_or(false)
            && probes.is_none()
        {
            *probes = Some(ProbeSettings::default());
            changed = true;
        }

        if !changed {
            return true;
        }
    }
    false
}

#[cfg(test)]
pub(super) fn implications() -> &'static [(Feature, Feature)] {
    IMPLICATIONS
}
