#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::resolve::implications;
use super::*;
use crate::tier::{tier_table, Feature, Tier};
use std::fs;
use tempfile::TempDir;

fn resolver() -> ConfigResolver<'static> {
    ConfigResolver::new(tier_table())
}

fn config(tier: Tier) -> ProjectConfiguration {
    ProjectConfiguration::new("svc", "example.com/svc", tier)
}

#[test]
fn test_basic_tier_defaults() {
    let resolved = resolver().resolve(&config(Tier::Basic)).unwrap();

    assert_eq!(
        resolved.enabled_features(),
        vec![Feature::HealthChecks, Feature::Logging]
    );
    assert_eq!(resolved.features().len(), Feature::ALL.len());
    assert!(resolved.probes().is_none());
    assert_eq!(resolved.output(), Path::new("svc"));
    assert!(!resolved.dependency_checks().database);
}

#[test]
fn test_output_dir_override() {
    let resolved = resolver()
        .resolve(&config(Tier::Basic).with_output("/tmp/out"))
        .unwrap();
    assert_eq!(resolved.output(), Path::new("/tmp/out"));
}

#[test]
fn test_enterprise_enables_security_through_compliance() {
    let table = tier_table();
    assert!(!table.get(Tier::Enterprise).enabled(Feature::Security));

    let resolved = resolver().resolve(&config(Tier::Enterprise)).unwrap();
    assert!(resolved.enabled(Feature::Security));
    assert!(resolved.enabled(Feature::Compliance));
    assert!(resolved.dependency_checks().audit_sink);
}

#[test]
fn test_disabling_required_feature_is_a_violation() {
    let cfg = config(Tier::Enterprise).with_override(Feature::Security, false);
    let err = resolver().resolve(&cfg).unwrap_err();

    assert!(err.violations().contains(&Violation::RequiredFeatureDisabled {
        feature: Feature::Security,
        required_by: Feature::Compliance,
    }));
}

#[test]
fn test_disabling_both_sides_of_an_implication_is_fine() {
    let cfg = config(Tier::Enterprise)
        .with_override(Feature::Security, false)
        .with_override(Feature::Compliance, false)
        .with_override(Feature::MultiTenancy, false);
    let resolved = resolver().resolve(&cfg).unwrap();

    assert!(!resolved.enabled(Feature::Security));
    assert!(!resolved.dependency_checks().audit_sink);
}

#[test]
fn test_every_violation_is_reported() {
    let mut cfg = ProjectConfiguration::new("", "  ", Tier::Basic);
    cfg.overrides.set_named("telemetry", true);
    cfg.overrides.set(Feature::Caching, true);

    let err = resolver().resolve(&cfg).unwrap_err();
    let violations = err.violations();

    assert!(violations.contains(&Violation::EmptyName));
    assert!(violations.contains(&Violation::EmptyModule));
    assert!(violations.contains(&Violation::UnknownFeature("telemetry".into())));
    assert!(violations.contains(&Violation::FeatureUnavailable {
        feature: Feature::Caching,
        tier: Tier::Basic,
        required: Tier::Advanced,
    }));
    assert_eq!(violations.len(), 4);

    let message = err.to_string();
    assert!(message.contains("4 violation(s)"));
    assert!(message.contains("telemetry"));
}

#[test]
fn test_malformed_identity() {
    let cfg = ProjectConfiguration::new("Orders API", "example.com/ orders", Tier::Basic);
    let err = resolver().resolve(&cfg).unwrap_err();

    assert_eq!(
        err.violations(),
        &[
            Violation::InvalidName("Orders API".into()),
            Violation::InvalidModule("example.com/ orders".into()),
        ]
    );
}

#[test]
fn test_downgrade_rejected_for_migration() {
    let err = resolver()
        .resolve_for_migration(&config(Tier::Basic), Tier::Advanced)
        .unwrap_err();
    assert_eq!(
        err.violations(),
        &[Violation::Downgrade {
            from: Tier::Advanced,
            to: Tier::Basic
        }]
    );

    assert!(resolver()
        .resolve_for_migration(&config(Tier::Advanced), Tier::Advanced)
        .is_ok());
}

#[test]
fn test_kubernetes_on_intermediate_populates_probes() {
    let cfg = config(Tier::Intermediate).with_override(Feature::KubernetesManifests, true);
    let resolved = resolver().resolve(&cfg).unwrap();

    let probes = resolved.probes().expect("probes should be populated");
    assert_eq!(probes.liveness_path, "/healthz");
    assert_eq!(probes.readiness_path, "/readyz");
    assert!(resolved.enabled(Feature::Docker));
}

#[test]
fn test_enterprise_probe_timings() {
    let resolved = resolver().resolve(&config(Tier::Enterprise)).unwrap();
    let probes = resolved.probes().unwrap();
    assert_eq!(probes.initial_delay_secs, 15);
    assert_eq!(probes.period_secs, 5);
    assert_eq!(probes.failure_threshold, 5);
}

#[test]
fn test_dependency_checks_follow_features() {
    let cfg = config(Tier::Advanced)
        .with_override(Feature::Caching, false)
        .with_override(Feature::Database, false);
    let resolved = resolver().resolve(&cfg).unwrap();

    let checks = resolved.dependency_checks();
    assert!(!checks.database);
    assert!(!checks.cache);
}

#[test]
fn test_tracing_requires_logging() {
    let cfg = config(Tier::Advanced).with_override(Feature::Logging, false);
    let err = resolver().resolve(&cfg).unwrap_err();
    assert!(err.violations().contains(&Violation::RequiredFeatureDisabled {
        feature: Feature::Logging,
        required_by: Feature::Tracing,
    }));
}

#[test]
fn test_resolution_is_deterministic() {
    let mut cfg = config(Tier::Advanced);
    cfg.overrides
        .set(Feature::Security, true)
        .set(Feature::Metrics, false);

    let a = resolver().resolve(&cfg).unwrap();
    let b = resolver().resolve(&cfg).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.overrides().get(Feature::Security), Some(true));
}

#[test]
fn test_implied_features_are_available_no_later_than_their_triggers() {
    // An implication must never enable a feature the tier cannot carry.
    for &(trigger, implied) in implications() {
        assert!(
            implied.available_from() <= trigger.available_from(),
            "{trigger} implies {implied} which needs a higher tier"
        );
    }
}

#[test]
fn test_every_tier_default_resolves() {
    for tier in Tier::ALL {
        let resolved = resolver().resolve(&config(tier)).unwrap();
        for feature in resolved.enabled_features() {
            assert!(feature.available_from() <= tier, "{feature} on {tier}");
        }
    }
}

#[test]
fn test_overrides_keep_unknown_names() {
    let mut overrides = FeatureOverrides::new();
    overrides.set_named("metrics", true).set_named("bogus", false);

    assert_eq!(overrides.get(Feature::Metrics), Some(true));
    assert_eq!(overrides.unknown().collect::<Vec<_>>(), vec!["bogus"]);
    assert!(overrides.known_only().unknown().next().is_none());
}

#[test]
fn test_overrides_merge_later_wins() {
    let base = FeatureOverrides::new()
        .with(Feature::Metrics, true)
        .with(Feature::Docker, true);
    let top = FeatureOverrides::new().with(Feature::Metrics, false);

    let merged = base.merged(&top);
    assert_eq!(merged.get(Feature::Metrics), Some(false));
    assert_eq!(merged.get(Feature::Docker), Some(true));
}

#[test]
fn test_load_project_file_missing_is_none() {
    let dir = TempDir::new().unwrap();
    assert!(load_project_file(&dir.path().join("tiergen.toml"))
        .unwrap()
        .is_none());
    assert!(find_project_file(dir.path()).is_none());
}

#[test]
fn test_load_project_file_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiergen.toml");
    fs::write(
        &path,
        r#"
name = "orders"
module = "example.com/orders"
tier = "intermediate"

[features]
kubernetes-manifests = true
metrics = false

[settings]
port = 9090
"#,
    )
    .unwrap();

    assert_eq!(find_project_file(dir.path()), Some(path.clone()));
    let file = load_project_file(&path).unwrap().unwrap();
    assert_eq!(file.name.as_deref(), Some("orders"));
    assert_eq!(file.tier, Some(Tier::Intermediate));
    assert_eq!(file.features.get(Feature::KubernetesManifests), Some(true));
    assert_eq!(file.features.get(Feature::Metrics), Some(false));

    let settings = file.settings.clone().unwrap();
    assert_eq!(settings.port, 9090);
    assert_eq!(settings.go_version, "1.22");
}

#[test]
fn test_load_project_file_yaml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiergen.yaml");
    fs::write(
        &path,
        "name: orders\nmodule: example.com/orders\ntier: advanced\nfeatures:\n  security: true\n",
    )
    .unwrap();

    let file = load_project_file(&path).unwrap().unwrap();
    assert_eq!(file.tier, Some(Tier::Advanced));
    assert_eq!(file.features.get(Feature::Security), Some(true));
}

#[test]
fn test_load_project_file_malformed_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiergen.toml");
    fs::write(&path, "name = [unterminated").unwrap();

    let err = load_project_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse project file"));
}

#[test]
fn test_cli_values_override_project_file() {
    let file = ProjectFile {
        name: Some("orders".into()),
        module: Some("example.com/orders".into()),
        tier: Some(Tier::Intermediate),
        features: FeatureOverrides::new()
            .with(Feature::Metrics, false)
            .with(Feature::Docker, false),
        ..ProjectFile::default()
    };
    let cli = FeatureOverrides::new().with(Feature::Metrics, true);

    let cfg = file.merge_into(None, None, Some(Tier::Advanced), None, &cli);
    assert_eq!(cfg.name, "orders");
    assert_eq!(cfg.module, "example.com/orders");
    assert_eq!(cfg.tier, Tier::Advanced);
    assert_eq!(cfg.overrides.get(Feature::Metrics), Some(true));
    assert_eq!(cfg.overrides.get(Feature::Docker), Some(false));
    assert_eq!(cfg.settings, ProjectSettings::default());
}
