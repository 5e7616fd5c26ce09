use crate::config::{
    find_project_file, load_project_file, ConfigResolver, FeatureOverrides, ProjectConfiguration,
};
use crate::error::{TiergenError, TiergenResult};
use crate::generator::{
    FileAction, GenerateOptions, GenerationManifest, Generator, Materialized, UpgradeKind,
    UpgradeRequest,
};
use crate::migrate::{Decision, MigrationOutcome};
use crate::runtime_config::RuntimeConfig;
use crate::templates::{DirectoryTemplates, TemplateRepository};
use crate::tier::{tier_table, Feature, Tier};
use crate::validator::{CheckStatus, ProjectValidator, ValidationReport};
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line interface for tiergen
#[derive(Parser, Debug)]
#[command(name = "tiergen", version)]
#[command(about = "Tiered service scaffolding generator", long_about = None)]
pub struct Cli {
    /// Template directory (catalog.yaml plus sources) to use instead of the built-in set
    #[arg(long, global = true, env = "TIERGEN_TEMPLATES")]
    pub templates: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// `--enable` / `--disable`, shared by every command that takes overrides.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Enable a feature (repeatable or comma-separated)
    #[arg(long, value_name = "FEATURE", value_delimiter = ',')]
    pub enable: Vec<String>,

    /// Disable a feature (repeatable or comma-separated)
    #[arg(long, value_name = "FEATURE", value_delimiter = ',')]
    pub disable: Vec<String>,
}

impl FeatureFlags {
    /// Sparse overrides; `--disable` wins when a feature is named by both.
    pub fn overrides(&self) -> FeatureOverrides {
        let mut overrides = FeatureOverrides::new();
        for name in &self.enable {
            overrides.set_named(name.trim(), true);
        }
        for name in &self.disable {
            overrides.set_named(name.trim(), false);
        }
        overrides
    }

    pub fn is_empty(&self) -> bool {
        self.enable.is_empty() && self.disable.is_empty()
    }
}

/// Available tiergen commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a new project for a tier
    Generate {
        /// Service name; also the default output directory
        #[arg(long)]
        name: Option<String>,

        /// Go module path, e.g. example.com/orders
        #[arg(long)]
        module: Option<String>,

        /// Complexity tier (default: basic)
        #[arg(long, value_enum)]
        tier: Option<Tier>,

        /// Output directory (default: ./<name>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        features: FeatureFlags,

        /// Project file (tiergen.toml / .yaml); auto-detected in the working directory
        #[arg(long)]
        config: Option<PathBuf>,

        /// Show what would be written without writing anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Run the project checks after generation
        #[arg(long, default_value_t = false)]
        validate: bool,

        /// Exit with code 4 if a check fails (implies --validate)
        #[arg(long, default_value_t = false)]
        fail_on_invalid: bool,
    },
    /// Move an existing project to a higher tier
    Migrate {
        /// Project directory
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Target tier; must not be lower than the current one
        #[arg(long, value_enum)]
        tier: Tier,

        #[command(flatten)]
        features: FeatureFlags,

        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Write <path>.tiergen-proposed next to each conflicting file
        #[arg(long, default_value_t = false)]
        write_proposed: bool,

        #[arg(long, default_value_t = false)]
        validate: bool,

        #[arg(long, default_value_t = false)]
        fail_on_invalid: bool,
    },
    /// Re-render a project with the current templates, same tier and features
    Update {
        #[arg(long, default_value = ".")]
        project: PathBuf,

        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[arg(long, default_value_t = false)]
        write_proposed: bool,
    },
    /// Change the feature overrides of a project, same tier
    Customize {
        #[arg(long, default_value = ".")]
        project: PathBuf,

        #[command(flatten)]
        features: FeatureFlags,

        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[arg(long, default_value_t = false)]
        write_proposed: bool,
    },
    /// Inspect the template catalog
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Run the project checks against a generated project
    Validate {
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Per-check timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the tier table
    Tiers,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// List artifacts, optionally only those selected for a tier
    List {
        #[arg(long, value_enum)]
        tier: Option<Tier>,

        #[command(flatten)]
        features: FeatureFlags,
    },
    /// Print an artifact's source
    Show {
        /// Artifact id
        id: String,
    },
}

/// Process exit code for an error returned by [`run_cli`].
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<TiergenError>()
        .map(TiergenError::exit_code)
        .unwrap_or(1)
}

/// Execute the CLI command provided by the user
///
/// # Errors
///
/// Engine failures are returned as [`TiergenError`] (possibly with context);
/// use [`exit_code_for`] to map them. A migration that ends with conflicts
/// returns [`TiergenError::MigrationConflict`] after printing its report.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env();
    let templates = cli.templates.as_deref();

    match cli.command {
        Commands::Generate {
            name,
            module,
            tier,
            output,
            features,
            config,
            dry_run,
            validate,
            fail_on_invalid,
        } => {
            let file = match config {
                Some(path) => Some(
                    load_project_file(&path)?
                        .with_context(|| format!("Config file not found: {}", path.display()))?,
                ),
                None => match find_project_file(Path::new(".")) {
                    Some(path) => load_project_file(&path)?,
                    None => None,
                },
            };
            let project = file
                .unwrap_or_default()
                .merge_into(name, module, tier, output, &features.overrides());

            let generator = Generator::new(repository(templates)?, runtime)?;
            let options = GenerateOptions {
                dry_run,
                validate: validate || fail_on_invalid,
                fail_on_invalid,
            };
            let outcome = generator.generate(&project, &options)?;

            print_materialized(&outcome.materialized);
            if let Some(report) = &outcome.validation {
                print_report(report);
            }
            let verb = if dry_run { "Would generate" } else { "Generated" };
            println!(
                "✅ {verb} {} ({} tier) in {}",
                outcome.config.name(),
                outcome.config.tier(),
                outcome.config.output().display()
            );
            Ok(())
        }
        Commands::Migrate {
            project,
            tier,
            features,
            dry_run,
            write_proposed,
            validate,
            fail_on_invalid,
        } => {
            let mut request = UpgradeRequest::new(project, UpgradeKind::Migrate(tier))
                .with_overrides(features.overrides())
                .dry_run(dry_run);
            request.apply.write_proposed = write_proposed;
            request.validate = validate || fail_on_invalid;
            request.fail_on_invalid = fail_on_invalid;
            upgrade(templates, runtime, &request)
        }
        Commands::Update {
            project,
            dry_run,
            write_proposed,
        } => {
            let mut request = UpgradeRequest::new(project, UpgradeKind::Update).dry_run(dry_run);
            request.apply.write_proposed = write_proposed;
            upgrade(templates, runtime, &request)
        }
        Commands::Customize {
            project,
            features,
            dry_run,
            write_proposed,
        } => {
            if features.is_empty() {
                bail!("customize needs at least one --enable or --disable");
            }
            let mut request = UpgradeRequest::new(project, UpgradeKind::Customize)
                .with_overrides(features.overrides())
                .dry_run(dry_run);
            request.apply.write_proposed = write_proposed;
            upgrade(templates, runtime, &request)
        }
        Commands::Template { command } => {
            let repo = repository(templates)?;
            match command {
                TemplateCommands::List { tier, features } => list_templates(&repo, tier, &features),
                TemplateCommands::Show { id } => {
                    let Some(artifact) = repo.get(&id) else {
                        bail!("Unknown template `{id}` in {} catalog", repo.origin());
                    };
                    println!("# {} → {} ({})", artifact.id, artifact.path, artifact.scope);
                    print!("{}", artifact.body);
                    Ok(())
                }
            }
        }
        Commands::Validate { project, timeout } => {
            let mut runtime = runtime;
            if let Some(secs) = timeout.filter(|s| *s > 0) {
                runtime.validate_timeout = Duration::from_secs(secs);
            }
            let openapi = openapi_enabled(&project)?;
            let report = ProjectValidator::standard(&runtime, openapi).validate(&project)?;
            print_report(&report);
            report.into_result()?;
            println!("✅ All checks passed");
            Ok(())
        }
        Commands::Tiers => {
            print_tiers();
            Ok(())
        }
    }
}

/// Whether the schema lint applies to `project`: from the manifest, or from
/// `api/openapi.yaml` when the directory was not generated by tiergen.
pub(crate) fn openapi_enabled(project: &Path) -> TiergenResult<bool> {
    match GenerationManifest::load(project) {
        Ok(manifest) => Ok(manifest.features.contains(&Feature::OpenApi)),
        Err(TiergenError::ManifestMissing { .. }) => {
            Ok(project.join("api/openapi.yaml").is_file())
        }
        Err(err) => Err(err),
    }
}

fn repository(templates: Option<&Path>) -> anyhow::Result<TemplateRepository> {
    let repo = match templates {
        Some(dir) => TemplateRepository::from_source(&DirectoryTemplates::new(dir))
            .with_context(|| format!("Failed to load templates from {}", dir.display()))?,
        None => TemplateRepository::builtin()?,
    };
    Ok(repo)
}

fn upgrade(
    templates: Option<&Path>,
    runtime: RuntimeConfig,
    request: &UpgradeRequest,
) -> anyhow::Result<()> {
    let generator = Generator::new(repository(templates)?, runtime)?;
    let (outcome, validation) = generator.upgrade(request)?;

    print_migration(&outcome);
    if let Some(report) = &validation {
        print_report(report);
    }
    if let Some(err) = outcome.conflict_error() {
        return Err(err.into());
    }

    let verb = if request.apply.dry_run {
        "Would migrate"
    } else {
        "Migrated"
    };
    println!(
        "✅ {verb} {} to the {} tier",
        request.project.display(),
        outcome.materialized.manifest.tier
    );
    Ok(())
}

fn list_templates(
    repo: &TemplateRepository,
    tier: Option<Tier>,
    features: &FeatureFlags,
) -> anyhow::Result<()> {
    let Some(tier) = tier else {
        for artifact in repo.iter() {
            let gates: Vec<&str> = artifact.features.iter().map(|f| f.as_str()).collect();
            println!(
                "{:<22} {:<28} {:<40} {}",
                artifact.id,
                artifact.scope.to_string(),
                artifact.path,
                gates.join(",")
            );
        }
        return Ok(());
    };

    let mut config = ProjectConfiguration::new("service", "example.com/service", tier);
    config.overrides = features.overrides();
    let resolved = ConfigResolver::new(tier_table())
        .resolve(&config)
        .map_err(TiergenError::from)?;
    for artifact in repo.resolve_artifacts(&resolved)? {
        println!("{:<22} {}", artifact.id, artifact.path);
    }
    Ok(())
}

fn print_materialized(materialized: &Materialized) {
    for outcome in &materialized.outcomes {
        match &outcome.action {
            FileAction::Created => println!("  ✨ {}", outcome.path),
            FileAction::Overwritten => println!("  🔄 {}", outcome.path),
            FileAction::Unchanged => println!("  ⏭️  {}", outcome.path),
            FileAction::WouldCreate => println!("  ➕ {}", outcome.path),
            FileAction::WouldOverwrite { diff } => {
                println!("  ✏️  {}", outcome.path);
                print!("{diff}");
            }
        }
    }
}

fn print_migration(outcome: &MigrationOutcome) {
    for decision in &outcome.plan.decisions {
        let icon = match decision.decision {
            Decision::Unchanged => "⏭️ ",
            Decision::EngineUpdate => "🔄",
            Decision::New => "✨",
            Decision::UserModified => "👤",
            Decision::Conflict => "⚠️ ",
            Decision::Retired => "🗑️ ",
        };
        println!("  {icon} {:<14} {}", decision.decision.as_str(), decision.path);
    }

    for file in &outcome.materialized.outcomes {
        if let FileAction::WouldOverwrite { diff } = &file.action {
            print!("{diff}");
        }
    }

    for conflict in &outcome.conflicts {
        println!();
        println!(
            "⚠️  Conflict: {} (live {}, proposed {})",
            conflict.path,
            conflict.live.short(),
            conflict.proposed.short()
        );
        match &conflict.proposed_path {
            Some(path) => println!("   Proposed content written to {}", path.display()),
            None => print!("{}", conflict.diff),
        }
    }
}

fn print_report(report: &ValidationReport) {
    for check in &report.checks {
        let icon = match check.status {
            CheckStatus::Passed => "✅",
            CheckStatus::Failed => "❌",
            CheckStatus::TimedOut => "⏱️ ",
            CheckStatus::Skipped => "⏭️ ",
        };
        println!("{icon} {:<16} {} ({} ms)", check.name, check.status, check.duration_ms);
        if check.status != CheckStatus::Passed && !check.diagnostics.trim().is_empty() {
            for line in check.diagnostics.lines() {
                println!("     {line}");
            }
        }
    }
}

fn print_tiers() {
    for definition in tier_table().iter() {
        let enabled: Vec<&str> = Feature::ALL
            .into_iter()
            .filter(|f| definition.enabled(*f))
            .map(Feature::as_str)
            .collect();
        println!("📦 {}", definition.tier);
        println!("   features: {}", enabled.join(", "));
        let checks = definition.dependency_checks;
        println!(
            "   readiness checks: database={} cache={} audit_sink={}",
            checks.database, checks.cache, checks.audit_sink
        );
        match &definition.probes {
            Some(p) => println!(
                "   probes: {} / {} delay={}s period={}s timeout={}s failures={}",
                p.liveness_path,
                p.readiness_path,
                p.initial_delay_secs,
                p.period_secs,
                p.timeout_secs,
                p.failure_threshold
            ),
            None => println!("   probes: none"),
        }
    }
}
