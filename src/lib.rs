//! # tiergen
//!
//! **tiergen** scaffolds Go services at one of four complexity tiers and
//! upgrades them later without overwriting the code you wrote.
//!
//! ## Overview
//!
//! A project is described by a name, a module path, a tier and a sparse set
//! of feature overrides. tiergen resolves that into a complete feature set,
//! picks the template artifacts for it, renders them, and writes the result
//! together with a manifest of what was generated. The manifest is what makes
//! later `migrate` / `update` / `customize` runs safe: every file is
//! classified by comparing the new render, the last render and what is on
//! disk now.
//!
//! ## Architecture
//!
//! - **[`tier`]** - Tiers, features and the immutable tier defaults table
//! - **[`config`]** - Project configuration, feature implications and constraint checking
//! - **[`templates`]** - Artifact catalog and template sources
//! - **[`generator`]** - Rendering, fingerprints, the manifest and atomic file writes
//! - **[`migrate`]** - Three-way classification and policy for upgrades
//! - **[`validator`]** - Build, vet, format and schema checks on a generated project
//! - **[`cli`]** - The `tiergen` command surface
//!
//! ### Generation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant User
//!     participant CLI as CLI<br/>(tiergen)
//!     participant Resolver as config::ConfigResolver
//!     participant Repo as templates::TemplateRepository
//!     participant Render as generator::RenderEngine
//!     participant Mat as generator::FileMaterializer
//!     participant FS as File System
//!
//!     User->>CLI: tiergen generate --name svc --tier advanced
//!     CLI->>Resolver: resolve(ProjectConfiguration)
//!     Resolver->>Resolver: tier defaults + overrides<br/>+ implications to fixpoint
//!     Resolver-->>CLI: ResolvedConfiguration (or every violation)
//!     CLI->>Repo: resolve_artifacts(&config)
//!     Repo-->>CLI: artifacts ordered by path
//!     CLI->>Render: render_all(artifacts, config)
//!     Render->>Render: strict minijinja render<br/>sha256 fingerprint per file
//!     Render-->>CLI: Vec<RenderedFile>
//!     CLI->>Mat: materialize(files, Create)
//!     Mat->>FS: temp file + rename, per file
//!     Mat->>FS: .tiergen-manifest.json (last)
//! ```
//!
//! ### Migration Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant CLI as CLI<br/>(tiergen migrate)
//!     participant Manifest as GenerationManifest
//!     participant Engine as migrate::MigrationEngine
//!     participant FS as File System
//!
//!     CLI->>Manifest: load(project)
//!     CLI->>CLI: resolve + render for the target tier
//!     CLI->>Engine: plan(manifest, renders, live tree)
//!     Engine->>FS: hash live files
//!     Engine-->>CLI: Unchanged / EngineUpdate / UserModified / Conflict / New / Retired
//!     CLI->>Engine: apply(plan)
//!     Engine->>FS: write New / EngineUpdate only
//!     Engine->>FS: updated manifest
//!     Engine-->>CLI: Complete or PartialSuccess + conflict reports
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tiergen generate --name orders --module example.com/orders --tier intermediate
//! cd orders && make run
//!
//! # later
//! tiergen migrate --project orders --tier advanced
//! ```
//!
//! ## Configuration
//!
//! Engine knobs come from the environment, see [`runtime_config`] and
//! [`logging`]. Set `SOURCE_DATE_EPOCH` for byte-identical output across runs.

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod logging;
pub mod migrate;
pub mod runtime_config;
pub mod templates;
pub mod tier;
pub mod validator;

pub use config::{ConfigResolver, ProjectConfiguration, ResolvedConfiguration};
pub use error::{TiergenError, TiergenResult};
pub use generator::{GenerateOptions, Generator, UpgradeKind, UpgradeRequest};
pub use tier::{Feature, Tier};
