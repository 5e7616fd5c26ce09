#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::generator::worker_pool;
use crate::tier::Tier;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn fp(text: &str) -> Fingerprint {
    Fingerprint::of(text.as_bytes())
}

fn entry(accepted: &str, rendered: Option<&str>) -> ManifestEntry {
    ManifestEntry {
        fingerprint: fp(accepted),
        rendered: rendered.map(fp),
        template: "t".to_string(),
        tier: Some(Tier::Basic),
        generated_at: None,
    }
}

struct MemoryTree(BTreeMap<String, Vec<u8>>);

impl MemoryTree {
    fn new(files: &[(&str, &str)]) -> Self {
        MemoryTree(
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect(),
        )
    }
}

impl LiveTree for MemoryTree {
    fn read(&self, path: &str) -> TiergenResult<Option<Vec<u8>>> {
        Ok(self.0.get(path).cloned())
    }
}

fn engine() -> MigrationEngine {
    let pool = worker_pool(2).unwrap();
    MigrationEngine::new(Arc::clone(&pool), FileMaterializer::new(pool))
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

fn manifest(tier: Tier, files: &[(&str, ManifestEntry)]) -> GenerationManifest {
    GenerationManifest {
        schema: "tiergen.manifest.v1".to_string(),
        tool_version: "test".to_string(),
        tier,
        generated_at: epoch(),
        project: None,
        features: Vec::new(),
        files: files
            .iter()
            .map(|(p, e)| (p.to_string(), e.clone()))
            .collect(),
    }
}

fn rendered(path: &str, content: &str) -> RenderedFile {
    RenderedFile::new(path, path, content.as_bytes().to_vec())
}

#[test]
fn test_classify_table() {
    let old = entry("v1", Some("v1"));

    assert_eq!(classify(None, None, &fp("v2")), Decision::New);
    assert_eq!(classify(None, Some(&fp("v2")), &fp("v2")), Decision::Unchanged);
    assert_eq!(classify(None, Some(&fp("mine")), &fp("v2")), Decision::Conflict);

    assert_eq!(classify(Some(&old), Some(&fp("v1")), &fp("v1")), Decision::Unchanged);
    assert_eq!(classify(Some(&old), Some(&fp("v1")), &fp("v2")), Decision::EngineUpdate);
    assert_eq!(classify(Some(&old), Some(&fp("mine")), &fp("v1")), Decision::UserModified);
    assert_eq!(classify(Some(&old), Some(&fp("mine")), &fp("v2")), Decision::Conflict);
    // user and templates converged
    assert_eq!(classify(Some(&old), Some(&fp("v2")), &fp("v2")), Decision::Unchanged);
}

#[test]
fn test_classify_deleted_tracked_file() {
    let old = entry("v1", Some("v1"));
    assert_eq!(classify(Some(&old), None, &fp("v1")), Decision::UserModified);
    assert_eq!(classify(Some(&old), None, &fp("v2")), Decision::Conflict);

    let owned = entry("mine", Some("v1"));
    assert_eq!(classify(Some(&owned), None, &fp("v1")), Decision::UserModified);
}

#[test]
fn test_classify_user_owned_entry_is_never_engine_update() {
    // A previous migration kept the user's version: accepted = mine, rendered = v1.
    let owned = entry("mine", Some("v1"));

    assert_eq!(classify(Some(&owned), Some(&fp("mine")), &fp("v1")), Decision::UserModified);
    assert_eq!(classify(Some(&owned), Some(&fp("mine")), &fp("v2")), Decision::Conflict);
    assert_eq!(classify(Some(&owned), Some(&fp("v1")), &fp("v2")), Decision::EngineUpdate);
}

#[test]
fn test_classify_old_manifest_without_rendered_field() {
    let legacy = entry("v1", None);
    assert_eq!(classify(Some(&legacy), Some(&fp("v1")), &fp("v2")), Decision::EngineUpdate);
    assert_eq!(classify(Some(&legacy), Some(&fp("mine")), &fp("v1")), Decision::UserModified);
}

#[test]
fn test_plan_covers_every_decision() {
    let prior = manifest(
        Tier::Basic,
        &[
            ("same.txt", entry("same", Some("same"))),
            ("engine.txt", entry("old", Some("old"))),
            ("user.txt", entry("tmpl", Some("tmpl"))),
            ("both.txt", entry("old", Some("old"))),
            ("gone.txt", entry("gone", Some("gone"))),
        ],
    );
    let live = MemoryTree::new(&[
        ("same.txt", "same"),
        ("engine.txt", "old"),
        ("user.txt", "edited"),
        ("both.txt", "edited"),
        ("gone.txt", "gone"),
    ]);
    let renders = vec![
        rendered("same.txt", "same"),
        rendered("engine.txt", "new"),
        rendered("user.txt", "tmpl"),
        rendered("both.txt", "new"),
        rendered("fresh.txt", "fresh"),
    ];

    let plan = engine().plan(&prior, renders, &live).unwrap();

    let decisions: Vec<_> = plan
        .decisions
        .iter()
        .map(|d| (d.path.as_str(), d.decision))
        .collect();
    assert_eq!(
        decisions,
        vec![
            ("both.txt", Decision::Conflict),
            ("engine.txt", Decision::EngineUpdate),
            ("fresh.txt", Decision::New),
            ("gone.txt", Decision::Retired),
            ("same.txt", Decision::Unchanged),
            ("user.txt", Decision::UserModified),
        ]
    );
    assert!(plan.has_conflicts());
    assert!(plan.get("gone.txt").unwrap().proposed.is_none());
}

#[test]
fn test_apply_respects_policy() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for (path, content) in [
        ("same.txt", "same"),
        ("engine.txt", "old"),
        ("user.txt", "edited"),
        ("both.txt", "edited"),
        ("gone.txt", "gone"),
    ] {
        fs::write(root.join(path), content).unwrap();
    }
    let prior = manifest(
        Tier::Basic,
        &[
            ("same.txt", entry("same", Some("same"))),
            ("engine.txt", entry("old", Some("old"))),
            ("user.txt", entry("tmpl", Some("tmpl"))),
            ("both.txt", entry("old", Some("old"))),
            ("gone.txt", entry("gone", Some("gone"))),
        ],
    );
    prior.store(root).unwrap();

    let live = FsLiveTree::new(root);
    let engine = engine();
    let plan = engine
        .plan(
            &prior,
            vec![
                rendered("same.txt", "same"),
                rendered("engine.txt", "new"),
                rendered("user.txt", "tmpl"),
                rendered("both.txt", "new"),
                rendered("fresh.txt", "fresh"),
            ],
            &live,
        )
        .unwrap();

    let header = manifest(Tier::Intermediate, &[]);
    let outcome = engine
        .apply(
            plan,
            root,
            header,
            &live,
            ApplyOptions {
                dry_run: false,
                write_proposed: true,
            },
        )
        .unwrap();

    assert_eq!(outcome.state, MigrationState::PartialSuccess);
    assert_eq!(fs::read_to_string(root.join("engine.txt")).unwrap(), "new");
    assert_eq!(fs::read_to_string(root.join("fresh.txt")).unwrap(), "fresh");
    assert_eq!(fs::read_to_string(root.join("user.txt")).unwrap(), "edited");
    assert_eq!(fs::read_to_string(root.join("both.txt")).unwrap(), "edited");
    assert_eq!(fs::read_to_string(root.join("gone.txt")).unwrap(), "gone");
    assert_eq!(
        fs::read_to_string(root.join("both.txt.tiergen-proposed")).unwrap(),
        "new"
    );

    let stored = GenerationManifest::load(root).unwrap();
    assert_eq!(stored, outcome.materialized.manifest);
    assert_eq!(stored.tier, Tier::Intermediate);
    assert!(!stored.files.contains_key("gone.txt"));
    assert!(!stored.files.contains_key("both.txt.tiergen-proposed"));

    let user = &stored.files["user.txt"];
    assert_eq!(user.fingerprint, fp("edited"));
    assert_eq!(user.rendered, Some(fp("tmpl")));

    // conflicts keep the previous entry untouched
    assert_eq!(stored.files["both.txt"], entry("old", Some("old")));
    assert_eq!(stored.files["engine.txt"].fingerprint, fp("new"));

    assert_eq!(outcome.conflicts.len(), 1);
    let conflict = &outcome.conflicts[0];
    assert_eq!(conflict.path, "both.txt");
    assert_eq!(conflict.live, fp("edited"));
    assert_eq!(conflict.proposed, fp("new"));
    assert_eq!(conflict.proposed_content, b"new".to_vec());
    assert!(conflict.diff.contains("-edited"));
    assert!(conflict.diff.contains("+new"));
    assert!(conflict.proposed_path.is_some());

    match outcome.conflict_error() {
        Some(TiergenError::MigrationConflict { paths }) => assert_eq!(paths, vec!["both.txt"]),
        other => panic!("expected a conflict error, got {other:?}"),
    }
}

#[test]
fn test_deleted_file_stays_deleted() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("kept.txt"), "v1").unwrap();
    let prior = manifest(
        Tier::Basic,
        &[
            ("kept.txt", entry("v1", Some("v1"))),
            ("removed.txt", entry("r1", Some("r1"))),
        ],
    );
    prior.store(root).unwrap();

    let live = FsLiveTree::new(root);
    let engine = engine();
    let renders = || vec![rendered("kept.txt", "v1"), rendered("removed.txt", "r1")];

    let plan = engine.plan(&prior, renders(), &live).unwrap();
    assert_eq!(plan.get("removed.txt").unwrap().decision, Decision::UserModified);
    let outcome = engine
        .apply(plan, root, manifest(Tier::Basic, &[]), &live, ApplyOptions::default())
        .unwrap();

    assert_eq!(outcome.state, MigrationState::Complete);
    assert!(!root.join("removed.txt").exists());
    let stored = GenerationManifest::load(root).unwrap();
    assert_eq!(stored.files["removed.txt"].fingerprint, fp("r1"));
    assert_eq!(stored.files["removed.txt"].rendered, Some(fp("r1")));

    // the next run still treats it as the user's decision
    let again = engine.plan(&stored, renders(), &live).unwrap();
    assert_eq!(again.get("removed.txt").unwrap().decision, Decision::UserModified);

    // a changed template for a deleted file is a conflict, not a silent re-create
    let changed = engine
        .plan(&stored, vec![rendered("kept.txt", "v1"), rendered("removed.txt", "r2")], &live)
        .unwrap();
    assert_eq!(changed.get("removed.txt").unwrap().decision, Decision::Conflict);
    let outcome = engine
        .apply(changed, root, manifest(Tier::Basic, &[]), &live, ApplyOptions::default())
        .unwrap();
    assert_eq!(outcome.state, MigrationState::PartialSuccess);
    assert!(!root.join("removed.txt").exists());
    assert_eq!(outcome.conflicts[0].proposed_content, b"r2".to_vec());
    assert!(outcome.conflicts[0].diff.contains("+r2"));
}

#[test]
fn test_apply_without_conflicts_completes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("a.txt"), "v1").unwrap();
    let prior = manifest(Tier::Basic, &[("a.txt", entry("v1", Some("v1")))]);

    let live = FsLiveTree::new(root);
    let engine = engine();
    let plan = engine
        .plan(&prior, vec![rendered("a.txt", "v2")], &live)
        .unwrap();
    let outcome = engine
        .apply(plan, root, manifest(Tier::Advanced, &[]), &live, ApplyOptions::default())
        .unwrap();

    assert_eq!(outcome.state, MigrationState::Complete);
    assert!(outcome.conflict_error().is_none());
    assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "v2");
    assert_eq!(
        outcome.materialized.manifest.files["a.txt"].tier,
        Some(Tier::Advanced)
    );
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("a.txt"), "v1\n").unwrap();
    fs::write(root.join("b.txt"), "mine\n").unwrap();
    let prior = manifest(
        Tier::Basic,
        &[
            ("a.txt", entry("v1\n", Some("v1\n"))),
            ("b.txt", entry("old\n", Some("old\n"))),
        ],
    );

    let live = FsLiveTree::new(root);
    let engine = engine();
    let plan = engine
        .plan(
            &prior,
            vec![rendered("a.txt", "v2\n"), rendered("b.txt", "new\n")],
            &live,
        )
        .unwrap();
    let outcome = engine
        .apply(
            plan,
            root,
            manifest(Tier::Advanced, &[]),
            &live,
            ApplyOptions {
                dry_run: true,
                write_proposed: true,
            },
        )
        .unwrap();

    assert_eq!(outcome.state, MigrationState::PartialSuccess);
    assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "v1\n");
    assert!(!root.join("b.txt.tiergen-proposed").exists());
    assert!(!GenerationManifest::exists_in(root));
    match &outcome.materialized.outcomes[0].action {
        crate::generator::FileAction::WouldOverwrite { diff } => {
            assert!(diff.contains("-v1"));
            assert!(diff.contains("+v2"));
        }
        other => panic!("unexpected action {other:?}"),
    }
}

#[test]
fn test_write_failure_leaves_manifest_alone() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let prior = manifest(Tier::Basic, &[("a.txt", entry("v1", Some("v1")))]);
    prior.store(root).unwrap();
    fs::write(root.join("a.txt"), "v1").unwrap();

    let live = FsLiveTree::new(root);
    let engine = engine();
    let plan = engine
        .plan(
            &prior,
            vec![rendered("a.txt", "v2"), rendered("blocked/inner.txt", "x")],
            &live,
        )
        .unwrap();

    // a file where a directory is needed makes the write fail
    fs::write(root.join("blocked"), "").unwrap();

    let err = engine
        .apply(plan, root, manifest(Tier::Advanced, &[]), &live, ApplyOptions::default())
        .unwrap_err();

    assert!(matches!(
        err,
        TiergenError::FileWrite { .. } | TiergenError::Io { .. }
    ));
    assert_eq!(GenerationManifest::load(root).unwrap(), prior);
}
