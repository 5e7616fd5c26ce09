//! Error types for the generation and migration engine.
//!
//! Every variant names the offending path, flag or template and carries a
//! remediation hint. Exit codes distinguish:
//! - configuration problems the caller can correct (2)
//! - conflicts that need a human (3)
//! - validation failures when `--fail-on-invalid` was requested (4)
//! - an existing project in the output directory (5)
//! - everything else, which is fatal (1)

use crate::config::ConfigValidationError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for engine operations.
#[derive(Debug, Error)]
pub enum TiergenError {
    /// The project configuration violates one or more constraints.
    #[error(transparent)]
    ConfigValidation(#[from] ConfigValidationError),

    /// An artifact requires another artifact that is not part of the rendered set.
    #[error("template `{id}` not found (required by `{required_by}`)")]
    TemplateNotFound { id: String, required_by: String },

    /// The template catalog itself is malformed.
    #[error("invalid template catalog {location}: {message}")]
    TemplateCatalog { location: String, message: String },

    /// A template could not be rendered.
    #[error("failed to render template `{template}`: {message}")]
    Render { template: String, message: String },

    /// `Create` mode found a manifest in the output directory.
    #[error("a generated project already exists at {}", manifest.display())]
    AlreadyExists { manifest: PathBuf },

    /// Writing a generated file failed.
    #[error("failed to write {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The project directory has no manifest to migrate from.
    #[error("no generation manifest found at {}", path.display())]
    ManifestMissing { path: PathBuf },

    /// The manifest exists but cannot be understood.
    #[error("generation manifest {} is unreadable: {message}", path.display())]
    ManifestCorrupt { path: PathBuf, message: String },

    /// One or more project checks failed and the caller asked to fail on it.
    #[error("project validation failed: {}", checks.join(", "))]
    ValidationFailure { checks: Vec<String> },

    /// Files changed on both sides since the last generation.
    #[error("{} file(s) need manual resolution: {}", paths.len(), paths.join(", "))]
    MigrationConflict { paths: Vec<String> },

    /// Reading project state failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An engine invariant did not hold.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TiergenError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TiergenError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn file_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TiergenError::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Recommended process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            TiergenError::ConfigValidation(_) => 2,
            TiergenError::MigrationConflict { .. } => 3,
            TiergenError::ValidationFailure { .. } => 4,
            TiergenError::AlreadyExists { .. } => 5,
            _ => 1,
        }
    }

    /// What the user can do about it.
    pub fn remediation(&self) -> String {
        match self {
            TiergenError::ConfigValidation(err) => err
                .violations()
                .iter()
                .map(|v| v.hint())
                .collect::<Vec<_>>()
                .join("; "),
            TiergenError::TemplateNotFound { id, .. } => format!(
                "add an artifact with id `{id}` to the catalog or relax the gating of the artifact that requires it"
            ),
            TiergenError::TemplateCatalog { .. } => {
                "fix the catalog entry; each needs id, path, source and exactly one of `since` / `only`"
                    .to_string()
            }
            TiergenError::Render { template, .. } => format!(
                "template `{template}` references a value the render context does not provide; nothing was written"
            ),
            TiergenError::AlreadyExists { .. } => {
                "use `tiergen migrate` or `tiergen update` for an existing project, or pick another output directory"
                    .to_string()
            }
            TiergenError::FileWrite { .. } => {
                "check permissions and free space, then re-run; files are replaced atomically and the manifest was not updated"
                    .to_string()
            }
            TiergenError::ManifestMissing { .. } => {
                "point --project at a directory created by `tiergen generate`".to_string()
            }
            TiergenError::ManifestCorrupt { .. } => {
                "restore .tiergen-manifest.json from version control".to_string()
            }
            TiergenError::ValidationFailure { .. } => {
                "inspect the check diagnostics; generated files were kept".to_string()
            }
            TiergenError::MigrationConflict { .. } => {
                "merge each listed file by hand (see the .tiergen-proposed copies), then run `tiergen update`"
                    .to_string()
            }
            TiergenError::Io { .. } => "check that the path exists and is readable".to_string(),
            TiergenError::Internal(_) => "please report this as a bug".to_string(),
        }
    }
}

/// Result type alias using TiergenError.
pub type TiergenResult<T> = Result<T, TiergenError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{ConfigValidationError, Violation};

    #[test]
    fn test_exit_codes_distinguish_categories() {
        let config = TiergenError::from(ConfigValidationError::new(vec![Violation::EmptyName]));
        assert_eq!(config.exit_code(), 2);
        assert_eq!(
            TiergenError::MigrationConflict {
                paths: vec!["a".into()]
            }
            .exit_code(),
            3
        );
        assert_eq!(
            TiergenError::AlreadyExists {
                manifest: PathBuf::from("svc/.tiergen-manifest.json")
            }
            .exit_code(),
            5
        );
        assert_eq!(
            TiergenError::file_write("x", io::Error::other("disk full")).exit_code(),
            1
        );
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = TiergenError::TemplateNotFound {
            id: "rbac".into(),
            required_by: "audit".into(),
        };
        assert!(err.to_string().contains("rbac"));
        assert!(err.to_string().contains("audit"));
        assert!(err.remediation().contains("rbac"));
    }

    #[test]
    fn test_config_remediation_joins_every_hint() {
        let err = TiergenError::from(ConfigValidationError::new(vec![
            Violation::EmptyName,
            Violation::EmptyModule,
        ]));
        let hint = err.remediation();
        assert!(hint.contains("--name"));
        assert!(hint.contains("--module"));
    }
}
