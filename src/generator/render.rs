//! Template rendering and content fingerprints.
//!
//! Rendering uses a single `minijinja` environment with strict undefined
//! handling: a template that references anything the [`RenderContext`] does
//! not provide fails with [`TiergenError::Render`] instead of emitting an
//! empty string. Output paths go through the same environment.

use crate::config::ResolvedConfiguration;
use crate::error::{TiergenError, TiergenResult};
use crate::templates::TemplateArtifact;
use crate::tier::{DependencyChecks, ProbeSettings, Tier};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::debug;

/// Version recorded in manifests and exposed to templates as `tool_version`.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stable hash of rendered bytes: `sha256:<lower hex>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Fingerprint(format!("sha256:{}", hex::encode(digest.as_slice())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines and tables.
    pub fn short(&self) -> &str {
        let hex = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        hex.get(..12).unwrap_or(hex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Final content for one output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Normalised, `/`-separated path relative to the project root
    pub path: String,
    /// Id of the artifact it was rendered from
    pub template: String,
    pub content: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl RenderedFile {
    pub fn new(path: impl Into<String>, template: impl Into<String>, content: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::of(&content);
        Self {
            path: path.into(),
            template: template.into(),
            content,
            fingerprint,
        }
    }
}

/// Every value a template can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderContext {
    pub name: String,
    pub module: String,
    pub tier: Tier,
    /// Every feature under its snake_case key
    pub features: BTreeMap<&'static str, bool>,
    pub probes: Option<ProbeSettings>,
    pub dependency_checks: DependencyChecks,
    pub port: u16,
    pub go_version: String,
    pub tool_version: &'static str,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub year: i32,
}

impl RenderContext {
    pub fn new(config: &ResolvedConfiguration, now: DateTime<Utc>) -> Self {
        Self {
            name: config.name().to_string(),
            module: config.module().to_string(),
            tier: config.tier(),
            features: config
                .features()
                .iter()
                .map(|(f, on)| (f.context_key(), *on))
                .collect(),
            probes: config.probes().cloned(),
            dependency_checks: config.dependency_checks(),
            port: config.settings().port,
            go_version: config.settings().go_version.clone(),
            tool_version: TOOL_VERSION,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            year: now.year(),
        }
    }
}

/// Renders template artifacts against a resolved configuration.
pub struct RenderEngine {
    env: Environment<'static>,
    pool: Arc<ThreadPool>,
    now: DateTime<Utc>,
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("workers", &self.pool.current_num_threads())
            .field("now", &self.now)
            .finish()
    }
}

impl RenderEngine {
    /// `now` feeds the `timestamp` and `year` template values.
    pub fn new(pool: Arc<ThreadPool>, now: DateTime<Utc>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("pascal_case", pascal_case);
        env.add_filter("snake_case", snake_case);
        Self { env, pool, now }
    }

    pub fn context(&self, config: &ResolvedConfiguration) -> RenderContext {
        RenderContext::new(config, self.now)
    }

    /// Render one artifact.
    pub fn render(
        &self,
        artifact: &TemplateArtifact,
        config: &ResolvedConfiguration,
    ) -> TiergenResult<RenderedFile> {
        let ctx = Value::from_serialize(self.context(config));
        self.render_with(artifact, &ctx)
    }

    /// Render every artifact on the worker pool.
    ///
    /// Output is ordered by concrete path. Two artifacts rendering to the same
    /// path is an error; nothing is returned in that case.
    pub fn render_all(
        &self,
        artifacts: &[&TemplateArtifact],
        config: &ResolvedConfiguration,
    ) -> TiergenResult<Vec<RenderedFile>> {
        let ctx = Value::from_serialize(self.context(config));

        let mut rendered = self.pool.install(|| {
            artifacts
                .par_iter()
                .map(|artifact| self.render_with(artifact, &ctx))
                .collect::<TiergenResult<Vec<_>>>()
        })?;

        rendered.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = rendered.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(TiergenError::Render {
                template: pair[1].template.clone(),
                message: format!(
                    "output path `{}` is also produced by `{}`",
                    pair[1].path, pair[0].template
                ),
            });
        }

        debug!(files = rendered.len(), "rendered template artifacts");
        Ok(rendered)
    }

    fn render_with(&self, artifact: &TemplateArtifact, ctx: &Value) -> TiergenResult<RenderedFile> {
        let render_error = |message: String| TiergenError::Render {
            template: artifact.id.clone(),
            message,
        };

        let raw_path = self
            .env
            .render_named_str(&format!("{}#path", artifact.id), &artifact.path, ctx)
            .map_err(|e| render_error(format!("output path: {e}")))?;
        let path = normalize_output_path(&raw_path).ok_or_else(|| {
            render_error(format!(
                "output path `{raw_path}` must be relative and stay inside the project"
            ))
        })?;

        let content = self
            .env
            .render_named_str(&artifact.source, &artifact.body, ctx)
            .map_err(|e| render_error(e.to_string()))?;

        let file = RenderedFile::new(path, artifact.id.clone(), content.into_bytes());
        debug!(path = %file.path, fingerprint = %file.fingerprint.short(), "rendered");
        Ok(file)
    }
}

/// `/`-joined normal components of `raw`, or `None` if it is empty, absolute
/// or climbs out of the root.
pub fn normalize_output_path(raw: &str) -> Option<String> {
    let mut parts = Vec::new();
    for comp in Path::new(raw.trim()).components() {
        match comp {
            Component::Normal(s) => parts.push(s.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// `orders-api` → `OrdersApi`
fn pascal_case(value: String) -> String {
    value
        .split(['-', '_', ' ', '.'])
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// `orders-api` → `orders_api`
fn snake_case(value: String) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

