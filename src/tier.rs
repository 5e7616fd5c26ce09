//! # Tier Definition Table
//!
//! Static description of the four complexity tiers and the closed set of
//! feature flags a generated service can carry.
//!
//! ## Overview
//!
//! Each [`Tier`] has a [`TierDefinition`] holding:
//! - **Default feature flags** - every [`Feature`] mapped to on/off
//! - **Dependency checks** - which dependencies the readiness probe verifies
//! - **Probe settings** - liveness/readiness timings for Kubernetes manifests
//!
//! The table is built once per process (see [`tier_table`]) and never mutated.
//!
//! ## Feature names
//!
//! Feature flags are a closed enum. Their kebab-case names (`health-checks`,
//! `kubernetes-manifests`, ...) are the only spellings accepted from config
//! files and the command line. Variants are declared in name order so that the
//! derived `Ord` sorts flags alphabetically by name.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Complexity tier of a generated project.
///
/// Ordered: `Basic < Intermediate < Advanced < Enterprise`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Single binary with logging and health checks
    Basic,
    /// Adds persistence, metrics, containers and an API description
    Intermediate,
    /// Adds tracing, caching, rate limiting and orchestration manifests
    Advanced,
    /// Adds compliance, audit and multi-tenancy
    Enterprise,
}

impl Tier {
    /// Every tier, lowest first.
    pub const ALL: [Tier; 4] = [
        Tier::Basic,
        Tier::Intermediate,
        Tier::Advanced,
        Tier::Enterprise,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// A name that does not match any tier or feature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown name `{0}`")]
pub struct UnknownName(pub String);

/// Feature flag that gates template artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Caching,
    Compliance,
    Database,
    Docker,
    HealthChecks,
    KubernetesManifests,
    Logging,
    Metrics,
    MultiTenancy,
    #[serde(rename = "openapi")]
    OpenApi,
    RateLimiting,
    Security,
    Tracing,
    TypescriptClient,
}

impl Feature {
    /// Every feature, in name order.
    pub const ALL: [Feature; 14] = [
        Feature::Caching,
        Feature::Compliance,
        Feature::Database,
        Feature::Docker,
        Feature::HealthChecks,
        Feature::KubernetesManifests,
        Feature::Logging,
        Feature::Metrics,
        Feature::MultiTenancy,
        Feature::OpenApi,
        Feature::RateLimiting,
        Feature::Security,
        Feature::Tracing,
        Feature::TypescriptClient,
    ];

    /// Flag name as written in config files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Caching => "caching",
            Feature::Compliance => "compliance",
            Feature::Database => "database",
            Feature::Docker => "docker",
            Feature::HealthChecks => "health-checks",
            Feature::KubernetesManifests => "kubernetes-manifests",
            Feature::Logging => "logging",
            Feature::Metrics => "metrics",
            Feature::MultiTenancy => "multi-tenancy",
            Feature::OpenApi => "openapi",
            Feature::RateLimiting => "rate-limiting",
            Feature::Security => "security",
            Feature::Tracing => "tracing",
            Feature::TypescriptClient => "typescript-client",
        }
    }

    /// Key under `features.` in the template context (`health_checks`, ...).
    pub fn context_key(self) -> &'static str {
        match self {
            Feature::Caching => "caching",
            Feature::Compliance => "compliance",
            Feature::Database => "database",
            Feature::Docker => "docker",
            Feature::HealthChecks => "health_checks",
            Feature::KubernetesManifests => "kubernetes_manifests",
            Feature::Logging => "logging",
            Feature::Metrics => "metrics",
            Feature::MultiTenancy => "multi_tenancy",
            Feature::OpenApi => "openapi",
            Feature::RateLimiting => "rate_limiting",
            Feature::Security => "security",
            Feature::Tracing => "tracing",
            Feature::TypescriptClient => "typescript_client",
        }
    }

    /// Lowest tier whose template set carries this feature's artifacts.
    pub fn available_from(self) -> Tier {
        match self {
            Feature::Logging | Feature::HealthChecks => Tier::Basic,
            Feature::Database
            | Feature::Metrics
            | Feature::Docker
            | Feature::OpenApi
            | Feature::KubernetesManifests => Tier::Intermediate,
            Feature::Tracing
            | Feature::Caching
            | Feature::RateLimiting
            | Feature::TypescriptClient
            | Feature::Security => Tier::Advanced,
            Feature::Compliance | Feature::MultiTenancy => Tier::Enterprise,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Dependencies the generated readiness endpoint verifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyChecks {
    pub database: bool,
    pub cache: bool,
    pub audit_sink: bool,
}

/// Liveness / readiness probe settings for orchestration manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub liveness_path: String,
    pub readiness_path: String,
    pub initial_delay_secs: u32,
    pub period_secs: u32,
    pub timeout_secs: u32,
    pub failure_threshold: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            liveness_path: "/healthz".to_string(),
            readiness_path: "/readyz".to_string(),
            initial_delay_secs: 10,
            period_secs: 10,
            timeout_secs: 2,
            failure_threshold: 3,
        }
    }
}

/// Defaults for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDefinition {
    pub tier: Tier,
    /// Every feature, mapped to its default state.
    pub features: BTreeMap<Feature, bool>,
    pub dependency_checks: DependencyChecks,
    pub probes: Option<ProbeSettings>,
}

impl TierDefinition {
    pub fn enabled(&self, feature: Feature) -> bool {
        self.features.get(&feature).copied().unwrap_or(false)
    }
}

/// Immutable tier → defaults mapping.
#[derive(Debug, Clone)]
pub struct TierDefinitionTable {
    definitions: [TierDefinition; 4],
}

impl TierDefinitionTable {
    fn builtin() -> Self {
        use Feature::*;

        let basic = [Logging, HealthChecks];
        let intermediate = [Logging, HealthChecks, Database, Metrics, Docker, OpenApi];
        let advanced = [
            Logging,
            HealthChecks,
            Database,
            Metrics,
            Docker,
            OpenApi,
            Tracing,
            Caching,
            RateLimiting,
            KubernetesManifests,
            TypescriptClient,
        ];
        // security comes from the compliance / multi-tenancy implications
        let enterprise = [
            Logging,
            HealthChecks,
            Database,
            Metrics,
            Docker,
            OpenApi,
            Tracing,
            Caching,
            RateLimiting,
            KubernetesManifests,
            TypescriptClient,
            Compliance,
            MultiTenancy,
        ];

        Self {
            definitions: [
                definition(Tier::Basic, &basic, DependencyChecks::default(), None),
                definition(
                    Tier::Intermediate,
                    &intermediate,
                    DependencyChecks {
                        database: true,
                        ..DependencyChecks::default()
                    },
                    None,
                ),
                definition(
                    Tier::Advanced,
                    &advanced,
                    DependencyChecks {
                        database: true,
                        cache: true,
                        audit_sink: false,
                    },
                    Some(ProbeSettings::default()),
                ),
                definition(
                    Tier::Enterprise,
                    &enterprise,
                    DependencyChecks {
                        database: true,
                        cache: true,
                        audit_sink: true,
                    },
                    Some(ProbeSettings {
                        initial_delay_secs: 15,
                        period_secs: 5,
                        failure_threshold: 5,
                        ..ProbeSettings::default()
                    }),
                ),
            ],
        }
    }

    /// Defaults for `tier`.
    pub fn get(&self, tier: Tier) -> &TierDefinition {
        // `definitions` is indexed in `Tier::ALL` order.
        &self.definitions[tier as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.definitions.iter()
    }
}

fn definition(
    tier: Tier,
    enabled: &[Feature],
    dependency_checks: DependencyChecks,
    probes: Option<ProbeSettings>,
) -> TierDefinition {
    let features = Feature::ALL
        .into_iter()
        .map(|f| (f, enabled.contains(&f)))
        .collect();
    TierDefinition {
        tier,
        features,
        dependency_checks,
        probes,
    }
}

static TIER_TABLE: Lazy<TierDefinitionTable> = Lazy::new(TierDefinitionTable::builtin);

/// The process-wide tier table.
pub fn tier_table() -> &'static TierDefinitionTable {
    &TIER_TABLE
}
