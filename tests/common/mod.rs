#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use tiergen::config::ProjectConfiguration;
use tiergen::generator::{GenerateOptions, GenerationOutcome, Generator};
use tiergen::runtime_config::RuntimeConfig;
use tiergen::tier::Tier;

/// Pinned `SOURCE_DATE_EPOCH` so trees compare byte for byte.
pub const EPOCH: i64 = 1_700_000_000;

pub fn pinned_runtime() -> RuntimeConfig {
    RuntimeConfig {
        workers: 4,
        source_date_epoch: Some(EPOCH),
        ..RuntimeConfig::default()
    }
}

pub fn generator() -> Generator {
    Generator::builtin(pinned_runtime()).unwrap()
}

pub fn config(root: &Path, tier: Tier) -> ProjectConfiguration {
    ProjectConfiguration::new("orders", "example.com/orders", tier).with_output(root)
}

pub fn generate(root: &Path, tier: Tier) -> GenerationOutcome {
    generator()
        .generate(&config(root, tier), &GenerateOptions::default())
        .unwrap()
}

/// Every regular file under `root`, keyed by `/`-separated relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap();
            (
                rel.to_string_lossy().replace('\\', "/"),
                fs::read(e.path()).unwrap(),
            )
        })
        .collect()
}

pub fn read_string(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}

pub fn append(root: &Path, path: &str, text: &str) {
    let mut content = read_string(root, path);
    content.push_str(text);
    fs::write(root.join(path), content).unwrap();
}

/// The built `tiergen` binary with a pinned clock and quiet logging.
pub fn tiergen() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tiergen"));
    cmd.env("SOURCE_DATE_EPOCH", EPOCH.to_string())
        .env("TIERGEN_LOG_LEVEL", "error")
        .env_remove("TIERGEN_TEMPLATES")
        .env_remove("RUST_LOG");
    cmd
}
