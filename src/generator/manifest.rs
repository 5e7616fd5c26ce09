//! The generation manifest: what the engine last wrote, per path.
//!
//! Stored as pretty JSON in `.tiergen-manifest.json` at the project root and
//! replaced atomically. Every field added after the first schema carries a
//! serde default, so manifests written by older versions keep loading.

use super::materialize::write_atomic;
use super::render::{Fingerprint, RenderedFile, TOOL_VERSION};
use crate::config::{FeatureOverrides, ProjectSettings, ResolvedConfiguration};
use crate::error::{TiergenError, TiergenResult};
use crate::tier::{Feature, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the manifest inside a generated project.
pub const MANIFEST_FILE: &str = ".tiergen-manifest.json";

/// Current manifest schema identifier.
pub const MANIFEST_SCHEMA: &str = "tiergen.manifest.v1";

fn default_schema() -> String {
    MANIFEST_SCHEMA.to_string()
}

/// Per-file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Content the engine last accepted on disk (its own render or the user's version)
    pub fingerprint: Fingerprint,
    /// Engine's last render of the artifact; equals `fingerprint` unless the user edited the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<Fingerprint>,
    /// Artifact id
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl ManifestEntry {
    /// Fingerprint of the engine's last render, falling back to the accepted one.
    pub fn rendered_fingerprint(&self) -> &Fingerprint {
        self.rendered.as_ref().unwrap_or(&self.fingerprint)
    }

    /// Entry for a file written exactly as rendered.
    pub fn written(file: &RenderedFile, tier: Tier, at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: file.fingerprint.clone(),
            rendered: Some(file.fingerprint.clone()),
            template: file.template.clone(),
            tier: Some(tier),
            generated_at: Some(at),
        }
    }

    /// Entry for a file the user changed: keep their content, remember our render.
    pub fn user_owned(
        live: Fingerprint,
        file: &RenderedFile,
        tier: Tier,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint: live,
            rendered: Some(file.fingerprint.clone()),
            template: file.template.clone(),
            tier: Some(tier),
            generated_at: Some(at),
        }
    }
}

/// Identity of the generated project, so `update` and `customize` can re-resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestProject {
    pub name: String,
    pub module: String,
    #[serde(default)]
    pub overrides: FeatureOverrides,
    #[serde(default)]
    pub settings: ProjectSettings,
}

/// Persisted record of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifest {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub tool_version: String,
    pub tier: Tier,
    #[serde(default)]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub project: Option<ManifestProject>,
    /// Enabled features after resolution, in name order
    #[serde(default)]
    pub features: Vec<Feature>,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl GenerationManifest {
    /// An empty manifest for `config`.
    pub fn new(config: &ResolvedConfiguration, generated_at: DateTime<Utc>) -> Self {
        Self {
            schema: default_schema(),
            tool_version: TOOL_VERSION.to_string(),
            tier: config.tier(),
            generated_at,
            project: Some(ManifestProject {
                name: config.name().to_string(),
                module: config.module().to_string(),
                overrides: config.overrides().clone(),
                settings: config.settings().clone(),
            }),
            features: config.enabled_features(),
            files: BTreeMap::new(),
        }
    }

    pub fn path_in(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    pub fn exists_in(root: &Path) -> bool {
        Self::path_in(root).is_file()
    }

    /// Load the manifest of the project at `root`.
    ///
    /// # Errors
    ///
    /// - [`TiergenError::ManifestMissing`] when there is no manifest
    /// - [`TiergenError::ManifestCorrupt`] when it does not parse
    pub fn load(root: &Path) -> TiergenResult<Self> {
        let path = Self::path_in(root);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(TiergenError::ManifestMissing { path })
            }
            Err(err) => return Err(TiergenError::io(path, err)),
        };
        serde_json::from_str(&text).map_err(|e| TiergenError::ManifestCorrupt {
            path,
            message: e.to_string(),
        })
    }

    /// Replace the manifest at `root` atomically.
    pub fn store(&self, root: &Path) -> TiergenResult<()> {
        let path = Self::path_in(root);
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| TiergenError::Internal(format!("serialize manifest: {e}")))?;
        json.push('\n');
        write_atomic(&path, json.as_bytes())
    }

    /// Equal apart from timestamps and the tool version.
    pub fn content_eq(&self, other: &GenerationManifest) -> bool {
        self.normalized() == other.normalized()
    }

    fn normalized(&self) -> GenerationManifest {
        let mut copy = self.clone();
        copy.generated_at = DateTime::<Utc>::default();
        copy.tool_version.clear();
        for entry in copy.files.values_mut() {
            entry.generated_at = None;
        }
        copy
    }
}
