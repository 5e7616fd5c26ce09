//! # Migration Engine
//!
//! Moves an existing generated project to a new artifact set without
//! overwriting anything the user changed.
//!
//! ## Classification
//!
//! For each rendered artifact at path `P`, with new render `R`, manifest entry
//! `M` (engine's last render `M.r`) and live file `L`:
//!
//! | Situation | Decision |
//! |---|---|
//! | no `M`, no live file | [`Decision::New`] |
//! | no `M`, `L != R` | [`Decision::Conflict`] |
//! | `L == R` | [`Decision::Unchanged`] |
//! | `M`, no live file, `R == M.r` | [`Decision::UserModified`] (deleted by the user) |
//! | `M`, no live file, `R != M.r` | [`Decision::Conflict`] |
//! | `L == M.r`, `R != L` | [`Decision::EngineUpdate`] |
//! | `L != M.r`, `R == M.r` | [`Decision::UserModified`] |
//! | `L != M.r`, `R != M.r` | [`Decision::Conflict`] |
//!
//! Paths in the manifest that no longer have an artifact are
//! [`Decision::Retired`]: left on disk, dropped from the manifest.
//!
//! ## Policy
//!
//! `New`, `Unchanged` and `EngineUpdate` are written. `UserModified` files are
//! kept and recorded with the user's fingerprint. `Conflict` files are never
//! written; they keep their previous manifest entry and are reported with the
//! proposed content and a diff, and the run ends in
//! [`MigrationState::PartialSuccess`].
//!
//! ## States
//!
//! ```text
//! Planning → Applying → Complete
//! Planning → Applying(partial) → PartialSuccess
//! Applying → Failed            (I/O error; manifest left as it was)
//! ```

#[cfg(test)]
mod tests;

use crate::error::{TiergenError, TiergenResult};
use crate::generator::manifest::{GenerationManifest, ManifestEntry};
use crate::generator::materialize::{
    unified_diff, write_atomic, FileMaterializer, MaterializeMode, Materialized,
};
use crate::generator::render::{Fingerprint, RenderedFile};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Suffix of the proposed-content copy written next to a conflicting file.
pub const PROPOSED_SUFFIX: &str = ".tiergen-proposed";

/// Per-file classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Decision {
    Unchanged,
    EngineUpdate,
    UserModified,
    Conflict,
    New,
    Retired,
}

impl Decision {
    /// Whether the file is written during apply.
    pub fn writes(self) -> bool {
        matches!(
            self,
            Decision::New | Decision::Unchanged | Decision::EngineUpdate
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Unchanged => "unchanged",
            Decision::EngineUpdate => "engine-update",
            Decision::UserModified => "user-modified",
            Decision::Conflict => "conflict",
            Decision::New => "new",
            Decision::Retired => "retired",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one path.
///
/// `recorded` is the prior manifest entry, `live` the fingerprint on disk and
/// `rendered` the new render.
pub fn classify(
    recorded: Option<&ManifestEntry>,
    live: Option<&Fingerprint>,
    rendered: &Fingerprint,
) -> Decision {
    let Some(entry) = recorded else {
        return match live {
            None => Decision::New,
            Some(live) if live == rendered => Decision::Unchanged,
            Some(_) => Decision::Conflict,
        };
    };

    let last_render = entry.rendered_fingerprint();
    let Some(live) = live else {
        // a tracked file the user deleted
        return if rendered == last_render {
            Decision::UserModified
        } else {
            Decision::Conflict
        };
    };
    if live == rendered {
        Decision::Unchanged
    } else if live == last_render {
        Decision::EngineUpdate
    } else if rendered == last_render {
        Decision::UserModified
    } else {
        Decision::Conflict
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDecision {
    pub path: String,
    pub decision: Decision,
    /// Fingerprint on disk, if the file exists
    pub live: Option<Fingerprint>,
    /// Prior manifest entry, if any
    pub recorded: Option<ManifestEntry>,
    /// New render; `None` only for `Retired`
    pub proposed: Option<RenderedFile>,
}

/// The project files as they are on disk.
pub trait LiveTree: Sync {
    /// Fingerprint of the file at `path`, or `None` when it does not exist.
    fn fingerprint(&self, path: &str) -> TiergenResult<Option<Fingerprint>> {
        Ok(self.read(path)?.map(|bytes| Fingerprint::of(&bytes)))
    }

    fn read(&self, path: &str) -> TiergenResult<Option<Vec<u8>>>;
}

/// [`LiveTree`] over a directory.
#[derive(Debug, Clone)]
pub struct FsLiveTree {
    root: PathBuf,
}

impl FsLiveTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LiveTree for FsLiveTree {
    fn read(&self, path: &str) -> TiergenResult<Option<Vec<u8>>> {
        let full = self.root.join(path);
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TiergenError::io(full, err)),
        }
    }
}

/// Every decision for a migration, ordered by path.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub decisions: Vec<MigrationDecision>,
}

impl MigrationPlan {
    pub fn count(&self, decision: Decision) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.decision == decision)
            .count()
    }

    pub fn has_conflicts(&self) -> bool {
        self.count(Decision::Conflict) > 0
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &MigrationDecision> {
        self.decisions
            .iter()
            .filter(|d| d.decision == Decision::Conflict)
    }

    pub fn get(&self, path: &str) -> Option<&MigrationDecision> {
        self.decisions.iter().find(|d| d.path == path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Planning,
    Applying { partial: bool },
    Complete,
    PartialSuccess,
    Failed,
}

impl MigrationState {
    fn advance(&mut self, next: MigrationState) {
        info!(from = ?*self, to = ?next, "migration state");
        *self = next;
    }
}

/// A file both the user and the templates changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub path: String,
    pub live: Fingerprint,
    pub proposed: Fingerprint,
    pub proposed_content: Vec<u8>,
    /// Unified diff from the live content to the proposed one
    pub diff: String,
    /// Where the proposed content was written, when requested
    pub proposed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Report only; write nothing.
    pub dry_run: bool,
    /// Write `<path>.tiergen-proposed` next to each conflicting file.
    pub write_proposed: bool,
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// `Complete` or `PartialSuccess`
    pub state: MigrationState,
    pub plan: MigrationPlan,
    pub materialized: Materialized,
    pub conflicts: Vec<ConflictReport>,
}

impl MigrationOutcome {
    /// The conflict error to surface when the run ended in `PartialSuccess`.
    pub fn conflict_error(&self) -> Option<TiergenError> {
        (self.state == MigrationState::PartialSuccess).then(|| TiergenError::MigrationConflict {
            paths: self.conflicts.iter().map(|c| c.path.clone()).collect(),
        })
    }
}

/// Plans and applies migrations.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    pool: Arc<ThreadPool>,
    materializer: FileMaterializer,
}

impl MigrationEngine {
    pub fn new(pool: Arc<ThreadPool>, materializer: FileMaterializer) -> Self {
        Self { pool, materializer }
    }

    /// Classify every rendered file against the prior manifest and the live tree.
    ///
    /// Read-only; live files are hashed on the worker pool.
    pub fn plan(
        &self,
        prior: &GenerationManifest,
        rendered: Vec<RenderedFile>,
        live: &dyn LiveTree,
    ) -> TiergenResult<MigrationPlan> {
        let targets: BTreeSet<String> = rendered.iter().map(|f| f.path.clone()).collect();

        let mut decisions = self.pool.install(|| {
            rendered
                .into_par_iter()
                .map(|file| -> TiergenResult<MigrationDecision> {
                    let recorded = prior.files.get(&file.path).cloned();
                    let live_fp = live.fingerprint(&file.path)?;
                    let decision = classify(recorded.as_ref(), live_fp.as_ref(), &file.fingerprint);
                    debug!(path = %file.path, decision = %decision, "classified");
                    Ok(MigrationDecision {
                        path: file.path.clone(),
                        decision,
                        live: live_fp,
                        recorded,
                        proposed: Some(file),
                    })
                })
                .collect::<TiergenResult<Vec<_>>>()
        })?;

        for (path, entry) in &prior.files {
            if !targets.contains(path) {
                decisions.push(MigrationDecision {
                    path: path.clone(),
                    decision: Decision::Retired,
                    live: live.fingerprint(path)?,
                    recorded: Some(entry.clone()),
                    proposed: None,
                });
            }
        }

        decisions.sort_by(|a, b| a.path.cmp(&b.path));
        let plan = MigrationPlan { decisions };
        info!(
            new = plan.count(Decision::New),
            unchanged = plan.count(Decision::Unchanged),
            engine_update = plan.count(Decision::EngineUpdate),
            user_modified = plan.count(Decision::UserModified),
            conflict = plan.count(Decision::Conflict),
            retired = plan.count(Decision::Retired),
            "migration planned"
        );
        Ok(plan)
    }

    /// Apply `plan` under `root`, recording the result in `manifest`.
    ///
    /// `manifest` is the header for the target configuration; entries are
    /// filled in here. In dry-run mode nothing is written and the returned
    /// manifest is the one that would have been stored.
    pub fn apply(
        &self,
        plan: MigrationPlan,
        root: &Path,
        mut manifest: GenerationManifest,
        live: &dyn LiveTree,
        options: ApplyOptions,
    ) -> TiergenResult<MigrationOutcome> {
        let mut state = MigrationState::Planning;
        let partial = plan.has_conflicts();
        state.advance(MigrationState::Applying { partial });

        match self.apply_inner(&plan, root, &mut manifest, live, options) {
            Ok((materialized, conflicts)) => {
                state.advance(if partial {
                    MigrationState::PartialSuccess
                } else {
                    MigrationState::Complete
                });
                Ok(MigrationOutcome {
                    state,
                    plan,
                    materialized,
                    conflicts,
                })
            }
            Err(err) => {
                state.advance(MigrationState::Failed);
                Err(err)
            }
        }
    }

    fn apply_inner(
        &self,
        plan: &MigrationPlan,
        root: &Path,
        manifest: &mut GenerationManifest,
        live: &dyn LiveTree,
        options: ApplyOptions,
    ) -> TiergenResult<(Materialized, Vec<ConflictReport>)> {
        let mut writable = Vec::new();
        let mut conflicts = Vec::new();

        for decision in &plan.decisions {
            match (decision.decision, &decision.proposed) {
                (d, Some(file)) if d.writes() => writable.push(file.clone()),
                (Decision::UserModified, Some(file)) => {
                    // A deleted file keeps its last accepted fingerprint so it stays deleted.
                    let accepted = decision
                        .live
                        .as_ref()
                        .or_else(|| decision.recorded.as_ref().map(|e| &e.fingerprint));
                    if let Some(accepted) = accepted {
                        manifest.files.insert(
                            decision.path.clone(),
                            ManifestEntry::user_owned(
                                accepted.clone(),
                                file,
                                manifest.tier,
                                manifest.generated_at,
                            ),
                        );
                    }
                }
                (Decision::Conflict, Some(file)) => {
                    if let Some(entry) = &decision.recorded {
                        manifest.files.insert(decision.path.clone(), entry.clone());
                    }
                    let report = self.report_conflict(decision, file, root, live, options)?;
                    warn!(path = %report.path, live = %report.live.short(), proposed = %report.proposed.short(), "conflict needs manual resolution");
                    conflicts.push(report);
                }
                (Decision::Retired, _) => {
                    debug!(path = %decision.path, "retired; left on disk, dropped from manifest");
                }
                _ => {}
            }
        }

        let mode = if options.dry_run {
            MaterializeMode::DryRun
        } else {
            MaterializeMode::Apply
        };
        let materialized = self
            .materializer
            .materialize(&writable, root, mode, manifest.clone())?;
        Ok((materialized, conflicts))
    }

    fn report_conflict(
        &self,
        decision: &MigrationDecision,
        file: &RenderedFile,
        root: &Path,
        live: &dyn LiveTree,
        options: ApplyOptions,
    ) -> TiergenResult<ConflictReport> {
        let live_content = live.read(&decision.path)?.unwrap_or_default();
        let live_fp = decision
            .live
            .clone()
            .unwrap_or_else(|| Fingerprint::of(&live_content));

        let proposed_path = if options.write_proposed && !options.dry_run {
            let path = root.join(format!("{}{PROPOSED_SUFFIX}", decision.path));
            write_atomic(&path, &file.content)?;
            Some(path)
        } else {
            None
        };

        Ok(ConflictReport {
            path: decision.path.clone(),
            live: live_fp,
            proposed: file.fingerprint.clone(),
            proposed_content: file.content.clone(),
            diff: unified_diff(&decision.path, &live_content, &file.content),
            proposed_path,
        })
    }
}
