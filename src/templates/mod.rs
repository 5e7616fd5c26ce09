//! # Template Repository
//!
//! Indexes the available template artifacts and decides which of them a
//! [`ResolvedConfiguration`] needs.
//!
//! ## Catalog
//!
//! Artifacts are declared in `catalog.yaml`:
//!
//! ```yaml
//! - id: k8s-deployment
//!   path: deploy/kubernetes/deployment.yaml
//!   source: deployment.yaml.j2
//!   tiers: { since: intermediate }
//!   features: [kubernetes-manifests]
//!   requires: [dockerfile, health-handler]
//! ```
//!
//! - `tiers.since` marks a shared artifact, included for that tier and every tier above it
//! - `tiers.only` lists the exact tiers an artifact belongs to
//! - `features` gate inclusion: every listed feature must be enabled
//! - `requires` names artifacts that must be part of the same selection
//!
//! The catalog is checked once, when the repository is built. Selection
//! itself cannot fail except when a selected artifact requires one that was
//! not selected, which points at a defect in the template set.

mod source;

pub use source::{BuiltinTemplates, DirectoryTemplates, TemplateSource};

use crate::config::ResolvedConfiguration;
use crate::error::{TiergenError, TiergenResult};
use crate::tier::{Feature, Tier};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which tiers an artifact is rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TierSelector")]
pub enum TierScope {
    /// Shared: this tier and every tier above it.
    Since(Tier),
    /// Exactly these tiers.
    Only(Vec<Tier>),
}

impl TierScope {
    pub fn includes(&self, tier: Tier) -> bool {
        match self {
            TierScope::Since(lowest) => tier >= *lowest,
            TierScope::Only(tiers) => tiers.contains(&tier),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, TierScope::Since(_))
    }
}

impl fmt::Display for TierScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierScope::Since(tier) => write!(f, "{tier}+"),
            TierScope::Only(tiers) => {
                let names: Vec<_> = tiers.iter().map(|t| t.as_str()).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TierSelector {
    since: Option<Tier>,
    only: Option<Vec<Tier>>,
}

impl TryFrom<TierSelector> for TierScope {
    type Error = String;

    fn try_from(selector: TierSelector) -> Result<Self, Self::Error> {
        match (selector.since, selector.only) {
            (Some(tier), None) => Ok(TierScope::Since(tier)),
            (None, Some(tiers)) if !tiers.is_empty() => Ok(TierScope::Only(tiers)),
            (None, Some(_)) => Err("`only` must list at least one tier".to_string()),
            _ => Err("tiers needs exactly one of `since` or `only`".to_string()),
        }
    }
}

/// One entry of `catalog.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    pub id: String,
    pub path: String,
    pub source: String,
    pub tiers: TierScope,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// A template-to-file mapping unit.
#[derive(Debug, Clone)]
pub struct TemplateArtifact {
    pub id: String,
    /// Output path relative to the project root; may contain template expressions
    pub path: String,
    pub scope: TierScope,
    /// Gating features; empty means always included for the tier
    pub features: Vec<Feature>,
    pub requires: Vec<String>,
    /// Catalog source name the body was loaded from
    pub source: String,
    pub body: Arc<str>,
}

impl TemplateArtifact {
    /// Whether this artifact belongs in the output for `config`.
    pub fn applies_to(&self, config: &ResolvedConfiguration) -> bool {
        self.scope.includes(config.tier()) && self.features.iter().all(|f| config.enabled(*f))
    }
}

/// Read-only index of template artifacts.
#[derive(Debug, Clone)]
pub struct TemplateRepository {
    origin: String,
    artifacts: BTreeMap<String, TemplateArtifact>,
}

impl TemplateRepository {
    /// The template set compiled into the binary.
    pub fn builtin() -> TiergenResult<Self> {
        Self::from_source(&BuiltinTemplates)
    }

    /// Load and check every artifact `source` declares.
    pub fn from_source(source: &dyn TemplateSource) -> TiergenResult<Self> {
        let origin = source.describe();
        let catalog_error = |message: String| TiergenError::TemplateCatalog {
            location: origin.clone(),
            message,
        };

        let entries: Vec<CatalogEntry> = serde_yaml::from_str(&source.catalog()?)
            .map_err(|e| catalog_error(format!("catalog.yaml: {e}")))?;

        let mut artifacts = BTreeMap::new();
        for entry in entries {
            if entry.id.trim().is_empty() {
                return Err(catalog_error("artifact with an empty id".to_string()));
            }
            if entry.path.trim().is_empty() {
                return Err(catalog_error(format!("artifact `{}` has an empty path", entry.id)));
            }
            if artifacts.contains_key(&entry.id) {
                return Err(catalog_error(format!("duplicate artifact id `{}`", entry.id)));
            }
            let body: Arc<str> = Arc::from(source.load(&entry.source)?);
            artifacts.insert(
                entry.id.clone(),
                TemplateArtifact {
                    id: entry.id,
                    path: entry.path,
                    scope: entry.tiers,
                    features: entry.features,
                    requires: entry.requires,
                    source: entry.source,
                    body,
                },
            );
        }

        for artifact in artifacts.values() {
            if let Some(missing) = artifact
                .requires
                .iter()
                .find(|id| !artifacts.contains_key(id.as_str()))
            {
                return Err(catalog_error(format!(
                    "artifact `{}` requires unknown artifact `{missing}`",
                    artifact.id
                )));
            }
        }

        debug!(origin = %origin, artifacts = artifacts.len(), "loaded template catalog");
        Ok(Self { origin, artifacts })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn get(&self, id: &str) -> Option<&TemplateArtifact> {
        self.artifacts.get(id)
    }

    /// Every artifact, by id.
    pub fn iter(&self) -> impl Iterator<Item = &TemplateArtifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// The artifacts `config` needs, ordered by output path template.
    ///
    /// # Errors
    ///
    /// [`TiergenError::TemplateNotFound`] when a selected artifact requires
    /// an artifact that was not selected.
    pub fn resolve_artifacts(
        &self,
        config: &ResolvedConfiguration,
    ) -> TiergenResult<Vec<&TemplateArtifact>> {
        let mut selected: Vec<&TemplateArtifact> = self
            .artifacts
            .values()
            .filter(|a| a.applies_to(config))
            .collect();

        let ids: BTreeSet<&str> = selected.iter().map(|a| a.id.as_str()).collect();
        for artifact in &selected {
            if let Some(missing) = artifact.requires.iter().find(|id| !ids.contains(id.as_str())) {
                return Err(TiergenError::TemplateNotFound {
                    id: missing.clone(),
                    required_by: artifact.id.clone(),
                });
            }
        }

        selected.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.id.cmp(&b.id)));
        debug!(tier = %config.tier(), artifacts = selected.len(), "selected template artifacts");
        Ok(selected)
    }
}
