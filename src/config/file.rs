//! Optional project configuration file.
//!
//! A `tiergen.toml` (or `tiergen.yaml` / `tiergen.yml`) in the working
//! directory pre-fills anything the command line does not set:
//!
//! ```toml
//! name = "orders"
//! module = "example.com/orders"
//! tier = "intermediate"
//!
//! [features]
//! kubernetes-manifests = true
//! metrics = false
//!
//! [settings]
//! port = 9090
//! ```
//!
//! A missing file is not an error. A file that exists but does not parse is.

use super::{FeatureOverrides, ProjectConfiguration, ProjectSettings};
use crate::tier::Tier;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Recognised file names, in lookup order.
pub const PROJECT_FILE_NAMES: [&str; 3] = ["tiergen.toml", "tiergen.yaml", "tiergen.yml"];

/// Contents of a project configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectFile {
    pub name: Option<String>,
    pub module: Option<String>,
    pub tier: Option<Tier>,
    pub output: Option<PathBuf>,
    pub features: FeatureOverrides,
    pub settings: Option<ProjectSettings>,
}

impl ProjectFile {
    /// Fill gaps in the command-line values from the file.
    ///
    /// Explicit CLI values win; feature overrides are layered with the CLI on top.
    pub fn merge_into(
        self,
        name: Option<String>,
        module: Option<String>,
        tier: Option<Tier>,
        output: Option<PathBuf>,
        cli_features: &FeatureOverrides,
    ) -> ProjectConfiguration {
        let mut config = ProjectConfiguration::new(
            name.or(self.name).unwrap_or_default(),
            module.or(self.module).unwrap_or_default(),
            tier.or(self.tier).unwrap_or(Tier::Basic),
        );
        config.output = output.or(self.output);
        config.overrides = self.features.merged(cli_features);
        if let Some(settings) = self.settings {
            config.settings = settings;
        }
        config
    }
}

/// First project file found in `dir`, if any.
pub fn find_project_file(dir: &Path) -> Option<PathBuf> {
    PROJECT_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load a project file.
///
/// # Returns
///
/// - `Ok(Some(file))` - the file exists and parsed
/// - `Ok(None)` - the file does not exist
/// - `Err(_)` - the file exists but could not be read or parsed
pub fn load_project_file(path: &Path) -> anyhow::Result<Option<ProjectFile>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file: {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let file: ProjectFile = if is_yaml {
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse project file: {}", path.display()))?
    } else {
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse project file: {}", path.display()))?
    };

    Ok(Some(file))
}
