//! # Project Validator
//!
//! Runs checks against a materialized project and aggregates the results.
//!
//! ## Checks
//!
//! | Check | What it runs | Fails when |
//! |---|---|---|
//! | `go-build` | `go build ./...` | non-zero exit |
//! | `go-vet` | `go vet ./...` | non-zero exit |
//! | `gofmt` | `gofmt -l .` | any file is listed |
//! | `openapi-schema` | schema lint on `api/openapi.yaml` | non-zero exit |
//! | `structured-files` | in-process parse of every YAML / JSON file | a file does not parse |
//!
//! External programs that are not installed yield [`CheckStatus::Skipped`].
//! Each check runs under its own timeout; on expiry the child process is
//! killed and the check reports [`CheckStatus::TimedOut`]. Checks never
//! modify the project tree.

use crate::error::{TiergenError, TiergenResult};
use crate::runtime_config::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Diagnostics beyond this many bytes are cut.
const MAX_DIAGNOSTICS: usize = 16 * 1024;

/// Directories the structured-file check does not descend into.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "vendor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Passed,
    Failed,
    TimedOut,
    /// The check could not run here, e.g. its program is not installed.
    Skipped,
}

impl CheckStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, CheckStatus::Failed | CheckStatus::TimedOut)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::TimedOut => "timed out",
            CheckStatus::Skipped => "skipped",
        })
    }
}

/// What a check reports before timing is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub diagnostics: String,
}

impl CheckOutcome {
    pub fn passed(diagnostics: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Passed,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Failed,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            diagnostics: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub diagnostics: String,
    pub duration_ms: u64,
}

/// Per-check results, in the order the checks were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// True when no check failed or timed out.
    pub fn passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status.is_failure())
    }

    /// Names of the checks that failed or timed out.
    pub fn failures(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.status.is_failure())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// `Err(ValidationFailure)` when a check failed.
    pub fn into_result(self) -> TiergenResult<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(TiergenError::ValidationFailure {
                checks: self.failures(),
            })
        }
    }
}

pub type CheckFuture = Pin<Box<dyn Future<Output = CheckOutcome> + Send + 'static>>;

/// One validation step.
pub trait ProjectCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Start the check against the project at `root`.
    fn run(&self, root: PathBuf) -> CheckFuture;
}

/// An external program run in the project root.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Treat any stdout as a failure (`gofmt -l` lists unformatted files and exits 0).
    pub fail_on_output: bool,
}

impl CommandCheck {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            fail_on_output: false,
        }
    }

    pub fn failing_on_output(mut self) -> Self {
        self.fail_on_output = true;
        self
    }
}

impl ProjectCheck for CommandCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, root: PathBuf) -> CheckFuture {
        let check = self.clone();
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&check.program);
            cmd.args(&check.args)
                .current_dir(&root)
                .stdin(Stdio::null())
                .kill_on_drop(true);

            let output = match cmd.output().await {
                Ok(output) => output,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return CheckOutcome::skipped(format!(
                        "`{}` is not installed",
                        check.program.display()
                    ))
                }
                Err(err) => {
                    return CheckOutcome::failed(format!(
                        "failed to start `{}`: {err}",
                        check.program.display()
                    ))
                }
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostics = truncate(format!("{}{}", stdout, stderr).trim().to_string());

            if !output.status.success() {
                CheckOutcome::failed(diagnostics)
            } else if check.fail_on_output && !stdout.trim().is_empty() {
                CheckOutcome::failed(diagnostics)
            } else {
                CheckOutcome::passed(diagnostics)
            }
        })
    }
}

/// Every generated YAML / JSON file must parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredFilesCheck;

impl ProjectCheck for StructuredFilesCheck {
    fn name(&self) -> &str {
        "structured-files"
    }

    fn run(&self, root: PathBuf) -> CheckFuture {
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || check_structured_files(&root)).await {
                Ok(outcome) => outcome,
                Err(err) => CheckOutcome::failed(format!("structured-file check aborted: {err}")),
            }
        })
    }
}

fn check_structured_files(root: &Path) -> CheckOutcome {
    let mut checked = 0usize;
    let mut problems = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                problems.push(err.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let kind = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => "yaml",
            Some("json") => "json",
            _ => continue,
        };
        let display = path.strip_prefix(root).unwrap_or(path).display().to_string();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                problems.push(format!("{display}: {err}"));
                continue;
            }
        };
        checked += 1;
        if let Err(message) = parse_structured(kind, &text) {
            problems.push(format!("{display}: {message}"));
        }
    }

    if problems.is_empty() {
        CheckOutcome::passed(format!("{checked} file(s) parsed"))
    } else {
        CheckOutcome::failed(truncate(problems.join("\n")))
    }
}

fn parse_structured(kind: &str, text: &str) -> Result<(), String> {
    if kind == "json" {
        return serde_json::from_str::<serde_json::Value>(text)
            .map(|_| ())
            .map_err(|e| e.to_string());
    }
    for document in serde_yaml::Deserializer::from_str(text) {
        serde_yaml::Value::deserialize(document).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_DIAGNOSTICS {
        let mut cut = MAX_DIAGNOSTICS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... (truncated)");
    }
    text
}

/// Runs a set of [`ProjectCheck`]s concurrently, each under a timeout.
pub struct ProjectValidator {
    checks: Vec<Arc<dyn ProjectCheck>>,
    timeout: Duration,
}

impl fmt::Debug for ProjectValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectValidator")
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProjectValidator {
    pub fn new(checks: Vec<Arc<dyn ProjectCheck>>, timeout: Duration) -> Self {
        Self { checks, timeout }
    }

    /// The built-in check set. `openapi` adds the schema lint.
    pub fn standard(runtime: &RuntimeConfig, openapi: bool) -> Self {
        let mut checks: Vec<Arc<dyn ProjectCheck>> = vec![
            Arc::new(CommandCheck::new("go-build", &runtime.go_bin, &["build", "./..."])),
            Arc::new(CommandCheck::new("go-vet", &runtime.go_bin, &["vet", "./..."])),
            Arc::new(CommandCheck::new("gofmt", runtime.gofmt_bin(), &["-l", "."]).failing_on_output()),
        ];
        if openapi {
            if let Some((program, leading)) = runtime.schema_lint.split_first() {
                let mut args: Vec<&str> = leading.iter().map(String::as_str).collect();
                args.push("api/openapi.yaml");
                checks.push(Arc::new(CommandCheck::new("openapi-schema", program, &args)));
            }
        }
        checks.push(Arc::new(StructuredFilesCheck));
        Self::new(checks, runtime.validate_timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every check against `root`.
    ///
    /// Only fails when the async runtime cannot be started; check failures
    /// are reported in the returned [`ValidationReport`].
    pub fn validate(&self, root: &Path) -> TiergenResult<ValidationReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tiergen-validate")
            .build()
            .map_err(|e| TiergenError::Internal(format!("start validation runtime: {e}")))?;

        let report = runtime.block_on(self.run_all(root.to_path_buf()));
        for check in &report.checks {
            match check.status {
                CheckStatus::Passed => debug!(check = %check.name, ms = check.duration_ms, "check passed"),
                CheckStatus::Skipped => info!(check = %check.name, reason = %check.diagnostics, "check skipped"),
                CheckStatus::Failed | CheckStatus::TimedOut => {
                    warn!(check = %check.name, status = %check.status, "check failed")
                }
            }
        }
        Ok(report)
    }

    async fn run_all(&self, root: PathBuf) -> ValidationReport {
        let mut set = JoinSet::new();
        for (index, check) in self.checks.iter().enumerate() {
            let name = check.name().to_string();
            let future = check.run(root.clone());
            let timeout = self.timeout;
            set.spawn(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, future).await {
                    Ok(outcome) => outcome,
                    Err(_) => CheckOutcome {
                        status: CheckStatus::TimedOut,
                        diagnostics: format!("no result after {}s", timeout.as_secs_f32()),
                    },
                };
                let result = CheckResult {
                    name,
                    status: outcome.status,
                    diagnostics: outcome.diagnostics,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                };
                (index, result)
            });
        }

        let mut results: Vec<(usize, CheckResult)> = Vec::with_capacity(self.checks.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(err) => warn!(error = %err, "validation task aborted"),
            }
        }
        results.sort_by_key(|(index, _)| *index);

        ValidationReport {
            checks: results.into_iter().map(|(_, r)| r).collect(),
        }
    }
}
