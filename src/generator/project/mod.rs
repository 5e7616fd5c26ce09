mod generate;
mod upgrade;

pub use generate::{GenerateOptions, GenerationOutcome, Generator};
pub use upgrade::{UpgradeKind, UpgradeRequest};
