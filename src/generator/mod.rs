//! # Generator Module
//!
//! Turns a resolved configuration into files on disk and keeps the record
//! needed to upgrade them later.
//!
//! ## Overview
//!
//! A generation run goes through four stages:
//!
//! ```text
//! ResolvedConfiguration → TemplateRepository → RenderEngine → FileMaterializer → ProjectValidator
//! ```
//!
//! 1. **Selection** - [`crate::templates::TemplateRepository`] picks the
//!    artifacts for the tier and enabled features
//! 2. **Rendering** - [`render::RenderEngine`] substitutes the typed
//!    [`render::RenderContext`] into every artifact and fingerprints the result
//! 3. **Materialization** - [`materialize::FileMaterializer`] writes each file
//!    atomically, then stores the [`manifest::GenerationManifest`]
//! 4. **Validation** - optional, see [`crate::validator`]
//!
//! Upgrades (`migrate`, `update`, `customize`) reuse stages 1 and 2, hand the
//! renders to [`crate::migrate::MigrationEngine`], which decides what may be
//! written, and finish with stages 3 and 4.
//!
//! ## Generated Structure
//!
//! A basic-tier project:
//!
//! ```text
//! svc/
//! ├── .tiergen-manifest.json   # What was generated, per path
//! ├── go.mod
//! ├── Makefile
//! ├── README.md
//! ├── cmd/svc/main.go
//! ├── config/app.yaml
//! └── internal/
//!     ├── config/config.go
//!     ├── handlers/{health.go, svc.go}
//!     ├── logging/logger.go
//!     └── server/server.go
//! ```
//!
//! Higher tiers add persistence, metrics, containers, orchestration
//! manifests, security, audit and tenancy packages.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tiergen::config::ProjectConfiguration;
//! use tiergen::generator::{GenerateOptions, Generator};
//! use tiergen::runtime_config::RuntimeConfig;
//! use tiergen::tier::Tier;
//!
//! let generator = Generator::builtin(RuntimeConfig::from_env())?;
//! let config = ProjectConfiguration::new("svc", "example.com/svc", Tier::Basic);
//! let outcome = generator.generate(&config, &GenerateOptions::default())?;
//! println!("wrote {} files", outcome.materialized.outcomes.len());
//! ```
//!
//! ## Concurrency
//!
//! Rendering, writing and live-file hashing fan out over a bounded rayon
//! pool sized by `TIERGEN_WORKERS`. The manifest is only written after every
//! file write has finished. Concurrent runs against the same output
//! directory are not coordinated and must be serialized by the caller.

pub mod manifest;
pub mod materialize;
mod project;
pub mod render;

pub use manifest::{GenerationManifest, ManifestEntry, ManifestProject, MANIFEST_FILE};
pub use materialize::{FileAction, FileMaterializer, FileOutcome, MaterializeMode, Materialized};
pub use project::{GenerateOptions, GenerationOutcome, Generator, UpgradeKind, UpgradeRequest};
pub use render::{Fingerprint, RenderContext, RenderEngine, RenderedFile, TOOL_VERSION};

use crate::error::{TiergenError, TiergenResult};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Bounded worker pool for render / write / hash fan-out.
pub fn worker_pool(workers: usize) -> TiergenResult<Arc<ThreadPool>> {
    ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("tiergen-worker-{i}"))
        .build()
        .map(Arc::new)
        .map_err(|e| TiergenError::Internal(format!("failed to start worker pool: {e}")))
}
