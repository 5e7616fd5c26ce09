use std::path::Path;
use std::sync::Arc;

use rayon::ThreadPool;
use tracing::{info, warn};

use crate::config::{ConfigResolver, ProjectConfiguration, ResolvedConfiguration};
use crate::error::{TiergenError, TiergenResult};
use crate::generator::manifest::GenerationManifest;
use crate::generator::materialize::{FileMaterializer, MaterializeMode, Materialized};
use crate::generator::render::{RenderEngine, RenderedFile};
use crate::generator::worker_pool;
use crate::runtime_config::RuntimeConfig;
use crate::templates::TemplateRepository;
use crate::tier::{tier_table, Feature};
use crate::validator::{ProjectValidator, ValidationReport};

/// Switches for [`Generator::generate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Report the files and diffs, write nothing
    pub dry_run: bool,
    /// Run the project checks after writing
    pub validate: bool,
    /// Turn failed checks into [`TiergenError::ValidationFailure`]
    pub fail_on_invalid: bool,
}

/// What a generate run produced.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub config: ResolvedConfiguration,
    pub materialized: Materialized,
    /// Present when validation was requested and files were written
    pub validation: Option<ValidationReport>,
}

/// The generate / upgrade pipeline with its worker pool and template set.
#[derive(Debug)]
pub struct Generator {
    repository: TemplateRepository,
    runtime: RuntimeConfig,
    pool: Arc<ThreadPool>,
    renderer: RenderEngine,
    materializer: FileMaterializer,
}

impl Generator {
    pub fn new(repository: TemplateRepository, runtime: RuntimeConfig) -> TiergenResult<Self> {
        let pool = worker_pool(runtime.workers)?;
        let renderer = RenderEngine::new(Arc::clone(&pool), runtime.now());
        let materializer = FileMaterializer::new(Arc::clone(&pool));
        Ok(Self {
            repository,
            runtime,
            pool,
            renderer,
            materializer,
        })
    }

    /// A generator over the templates compiled into the binary.
    pub fn builtin(runtime: RuntimeConfig) -> TiergenResult<Self> {
        Self::new(TemplateRepository::builtin()?, runtime)
    }

    pub fn repository(&self) -> &TemplateRepository {
        &self.repository
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub(crate) fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub(crate) fn materializer(&self) -> &FileMaterializer {
        &self.materializer
    }

    pub fn resolver(&self) -> ConfigResolver<'static> {
        ConfigResolver::new(tier_table())
    }

    pub fn resolve(&self, config: &ProjectConfiguration) -> TiergenResult<ResolvedConfiguration> {
        Ok(self.resolver().resolve(config)?)
    }

    /// Select and render every artifact for `config`. Nothing is written.
    pub fn render(&self, config: &ResolvedConfiguration) -> TiergenResult<Vec<RenderedFile>> {
        let artifacts = self.repository.resolve_artifacts(config)?;
        self.renderer.render_all(&artifacts, config)
    }

    /// Generate a fresh project.
    ///
    /// # Errors
    ///
    /// - configuration violations, before anything else happens
    /// - template and render errors, before any file is written
    /// - [`TiergenError::AlreadyExists`] when the output directory holds a manifest
    /// - [`TiergenError::FileWrite`] on I/O failure; the manifest is not written
    /// - [`TiergenError::ValidationFailure`] only with `fail_on_invalid`
    pub fn generate(
        &self,
        config: &ProjectConfiguration,
        options: &GenerateOptions,
    ) -> TiergenResult<GenerationOutcome> {
        let resolved = self.resolve(config)?;
        let root = resolved.output().to_path_buf();
        info!(
            name = %resolved.name(),
            tier = %resolved.tier(),
            output = %root.display(),
            dry_run = options.dry_run,
            "generating project"
        );

        if GenerationManifest::exists_in(&root) {
            return Err(TiergenError::AlreadyExists {
                manifest: GenerationManifest::path_in(&root),
            });
        }

        let files = self.render(&resolved)?;
        let mode = if options.dry_run {
            MaterializeMode::DryRun
        } else {
            MaterializeMode::Create
        };
        let manifest = GenerationManifest::new(&resolved, self.runtime.now());
        let materialized = self.materializer.materialize(&files, &root, mode, manifest)?;

        let validation = if options.validate && !options.dry_run {
            let report = self.validate(&root, resolved.enabled(Feature::OpenApi))?;
            Some(check_report(report, options.fail_on_invalid)?)
        } else {
            None
        };

        Ok(GenerationOutcome {
            config: resolved,
            materialized,
            validation,
        })
    }

    /// Run the project checks against `root`.
    pub fn validate(&self, root: &Path, openapi: bool) -> TiergenResult<ValidationReport> {
        ProjectValidator::standard(&self.runtime, openapi).validate(root)
    }
}

/// Log failed checks; fail only when asked to.
pub(super) fn check_report(
    report: ValidationReport,
    fail_on_invalid: bool,
) -> TiergenResult<ValidationReport> {
    for check in report.checks.iter().filter(|c| c.status.is_failure()) {
        warn!(check = %check.name, status = %check.status, diagnostics = %check.diagnostics, "validation check did not pass");
    }
    if fail_on_invalid {
        report.into_result()
    } else {
        Ok(report)
    }
}
