use crate::error::{TiergenError, TiergenResult};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Where template artifacts come from.
///
/// The repository only needs the catalog text and the payload for a given
/// source name; how those are stored is up to the implementation.
pub trait TemplateSource: Send + Sync {
    /// Human readable origin, used in error messages and `template list`.
    fn describe(&self) -> String;

    /// Contents of `catalog.yaml`.
    fn catalog(&self) -> TiergenResult<String>;

    /// Payload for a catalog `source` name.
    fn load(&self, source: &str) -> TiergenResult<String>;
}

macro_rules! builtin {
    ($($name:literal),* $(,)?) => {
        &[$(($name, include_str!(concat!("../../templates/", $name)))),*]
    };
}

/// Payloads compiled into the binary, keyed by catalog `source` name.
static BUILTIN_PAYLOADS: &[(&str, &str)] = builtin![
    "0001_init.sql.j2",
    "Dockerfile.j2",
    "Makefile.j2",
    "README.md.j2",
    "app.yaml.j2",
    "architecture.md.j2",
    "audit.go.j2",
    "cache.go.j2",
    "client.ts.j2",
    "compliance.md.j2",
    "config.go.j2",
    "database.go.j2",
    "deployment.yaml.j2",
    "dockerignore.j2",
    "gitignore.j2",
    "go.mod.j2",
    "health.go.j2",
    "logger.go.j2",
    "main.go.j2",
    "metrics.go.j2",
    "mtls.go.j2",
    "networkpolicy.yaml.j2",
    "openapi.yaml.j2",
    "ratelimit.go.j2",
    "rbac.go.j2",
    "resource_handler.go.j2",
    "server.go.j2",
    "service.yaml.j2",
    "tenant.go.j2",
    "tracing.go.j2",
];

static BUILTIN_CATALOG: &str = include_str!("../../templates/catalog.yaml");

/// The template set shipped with the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl TemplateSource for BuiltinTemplates {
    fn describe(&self) -> String {
        "builtin".to_string()
    }

    fn catalog(&self) -> TiergenResult<String> {
        Ok(BUILTIN_CATALOG.to_string())
    }

    fn load(&self, source: &str) -> TiergenResult<String> {
        BUILTIN_PAYLOADS
            .iter()
            .find(|(name, _)| *name == source)
            .map(|(_, body)| (*body).to_string())
            .ok_or_else(|| TiergenError::TemplateCatalog {
                location: self.describe(),
                message: format!("no embedded template named `{source}`"),
            })
    }
}

/// A template set read from a directory laid out like the builtin one:
/// `catalog.yaml` plus the payload files it names.
#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    root: PathBuf,
}

impl DirectoryTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` under the root, refusing anything that could escape it.
    fn map_path(&self, name: &str) -> Option<PathBuf> {
        let mut pb = self.root.clone();
        for comp in Path::new(name).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn read(&self, path: &Path) -> TiergenResult<String> {
        fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => TiergenError::TemplateCatalog {
                location: self.describe(),
                message: format!("missing template file {}", path.display()),
            },
            _ => TiergenError::io(path, err),
        })
    }
}

impl TemplateSource for DirectoryTemplates {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn catalog(&self) -> TiergenResult<String> {
        self.read(&self.root.join("catalog.yaml"))
    }

    fn load(&self, source: &str) -> TiergenResult<String> {
        let path = self
            .map_path(source)
            .ok_or_else(|| TiergenError::TemplateCatalog {
                location: self.describe(),
                message: format!("template source `{source}` must be a relative path inside the template directory"),
            })?;
        self.read(&path)
    }
}
