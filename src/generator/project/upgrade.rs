use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::generate::{check_report, Generator};
use crate::config::{FeatureOverrides, ProjectConfiguration};
use crate::error::{TiergenError, TiergenResult};
use crate::generator::manifest::GenerationManifest;
use crate::migrate::{ApplyOptions, FsLiveTree, MigrationEngine, MigrationOutcome};
use crate::tier::{Feature, Tier};
use crate::validator::ValidationReport;

/// Which command started the upgrade; they differ only in what may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeKind {
    /// Move to a tier at or above the recorded one.
    Migrate(Tier),
    /// Same tier and overrides, current templates.
    Update,
    /// Same tier, new overrides layered on the recorded ones.
    Customize,
}

/// Input for [`Generator::upgrade`].
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub project: PathBuf,
    pub kind: UpgradeKind,
    /// Layered over the overrides recorded in the manifest
    pub overrides: FeatureOverrides,
    pub apply: ApplyOptions,
    pub validate: bool,
    pub fail_on_invalid: bool,
}

impl UpgradeRequest {
    pub fn new(project: impl Into<PathBuf>, kind: UpgradeKind) -> Self {
        Self {
            project: project.into(),
            kind,
            overrides: FeatureOverrides::default(),
            apply: ApplyOptions::default(),
            validate: false,
            fail_on_invalid: false,
        }
    }

    pub fn with_overrides(mut self, overrides: FeatureOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.apply.dry_run = dry_run;
        self
    }
}

impl Generator {
    /// Re-render an existing project and reconcile it with what is on disk.
    ///
    /// Files the user changed are never overwritten. When both sides changed
    /// a file the outcome ends in `PartialSuccess` and lists the conflicts;
    /// use [`MigrationOutcome::conflict_error`] to turn that into an error.
    pub fn upgrade(
        &self,
        request: &UpgradeRequest,
    ) -> TiergenResult<(MigrationOutcome, Option<ValidationReport>)> {
        let root = &request.project;
        let prior = GenerationManifest::load(root)?;
        let project = prior
            .project
            .clone()
            .ok_or_else(|| TiergenError::ManifestCorrupt {
                path: GenerationManifest::path_in(root),
                message: "manifest does not record the project name and module".to_string(),
            })?;

        let tier = match request.kind {
            UpgradeKind::Migrate(tier) => tier,
            UpgradeKind::Update | UpgradeKind::Customize => prior.tier,
        };
        let overrides = match request.kind {
            UpgradeKind::Update => project.overrides.clone(),
            UpgradeKind::Migrate(_) | UpgradeKind::Customize => {
                project.overrides.merged(&request.overrides)
            }
        };

        let mut config = ProjectConfiguration::new(project.name, project.module, tier)
            .with_output(root.clone());
        config.overrides = overrides;
        config.settings = project.settings;

        let resolved = self.resolver().resolve_for_migration(&config, prior.tier)?;
        info!(
            project = %root.display(),
            from = %prior.tier,
            to = %resolved.tier(),
            kind = ?request.kind,
            "upgrading project"
        );

        let rendered = self.render(&resolved)?;
        let live = FsLiveTree::new(root.clone());
        let engine = MigrationEngine::new(Arc::clone(self.pool()), self.materializer().clone());
        let plan = engine.plan(&prior, rendered, &live)?;

        let header = GenerationManifest::new(&resolved, self.runtime().now());
        let outcome = engine.apply(plan, root, header, &live, request.apply)?;

        let validation = if request.validate && !request.apply.dry_run {
            let report = self.validate(root, resolved.enabled(Feature::OpenApi))?;
            Some(check_report(report, request.fail_on_invalid)?)
        } else {
            None
        };

        Ok((outcome, validation))
    }
}
