//! Property-based tests for deterministic resolution and rendering.
//!
//! These tests verify that:
//! - Resolving the same configuration twice gives the same result
//! - The order overrides are supplied in does not matter
//! - Derived feature constraints hold for every accepted configuration
//! - Rendered output is identical across runs and ordered by path

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use once_cell::sync::Lazy;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tiergen::config::{FeatureOverrides, ProjectConfiguration};
use tiergen::generator::Generator;
use tiergen::tier::{Feature, Tier};

static GENERATOR: Lazy<Generator> = Lazy::new(common::generator);

fn arb_tier() -> impl Strategy<Value = Tier> {
    prop::sample::select(Tier::ALL.to_vec())
}

fn arb_overrides() -> impl Strategy<Value = BTreeMap<Feature, bool>> {
    prop::collection::btree_map(prop::sample::select(Feature::ALL.to_vec()), any::<bool>(), 0..6)
}

fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-z][a-z0-9-]{0,10}").unwrap()
}

fn project(name: &str, tier: Tier, overrides: impl IntoIterator<Item = (Feature, bool)>) -> ProjectConfiguration {
    let mut config = ProjectConfiguration::new(name, format!("example.com/{name}"), tier);
    let mut set = FeatureOverrides::new();
    for (feature, enabled) in overrides {
        set.set(feature, enabled);
    }
    config.overrides = set;
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Resolution is a pure function of its input.
    #[test]
    fn resolution_is_deterministic(name in arb_name(), tier in arb_tier(), overrides in arb_overrides()) {
        let config = project(&name, tier, overrides);
        let first = format!("{:?}", GENERATOR.resolve(&config));
        let second = format!("{:?}", GENERATOR.resolve(&config));
        prop_assert_eq!(first, second);
    }

    /// Supplying the same overrides in reverse order changes nothing.
    #[test]
    fn override_order_is_irrelevant(tier in arb_tier(), overrides in arb_overrides()) {
        let forward = project("svc", tier, overrides.clone());
        let reverse = project("svc", tier, overrides.into_iter().rev());
        prop_assert_eq!(
            format!("{:?}", GENERATOR.resolve(&forward)),
            format!("{:?}", GENERATOR.resolve(&reverse))
        );
    }

    /// Every accepted configuration satisfies the derived constraints.
    #[test]
    fn implications_hold(tier in arb_tier(), overrides in arb_overrides()) {
        if let Ok(resolved) = GENERATOR.resolve(&project("svc", tier, overrides)) {
            for (trigger, implied) in [
                (Feature::Compliance, Feature::Security),
                (Feature::Compliance, Feature::Logging),
                (Feature::KubernetesManifests, Feature::Docker),
                (Feature::KubernetesManifests, Feature::HealthChecks),
                (Feature::MultiTenancy, Feature::Security),
                (Feature::Tracing, Feature::Logging),
                (Feature::TypescriptClient, Feature::OpenApi),
            ] {
                if resolved.enabled(trigger) {
                    prop_assert!(resolved.enabled(implied), "{:?} without {:?}", trigger, implied);
                }
            }
        }
    }

    /// Rendering twice gives the same bytes, ordered by path.
    #[test]
    fn rendering_is_deterministic(name in arb_name(), tier in arb_tier(), overrides in arb_overrides()) {
        if let Ok(resolved) = GENERATOR.resolve(&project(&name, tier, overrides)) {
            let first = GENERATOR.render(&resolved).unwrap();
            let second = GENERATOR.render(&resolved).unwrap();
            prop_assert_eq!(&first, &second);

            for pair in first.windows(2) {
                prop_assert!(pair[0].path < pair[1].path, "{} !< {}", pair[0].path, pair[1].path);
            }
            for file in &first {
                prop_assert!(!file.path.starts_with('/'));
                prop_assert!(!file.path.split('/').any(|c| c == ".." || c.is_empty()));
            }
        }
    }
}
