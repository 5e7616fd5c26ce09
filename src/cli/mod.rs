//! # CLI Module
//!
//! Command-line surface of the `tiergen` binary.
//!
//! ## Commands
//!
//! ### `generate`
//!
//! Create a new project for a tier:
//!
//! ```bash
//! tiergen generate --name orders --module example.com/orders --tier intermediate
//! ```
//!
//! Options:
//! - `--output <DIR>` - Output directory (default: the project name)
//! - `--enable <FEATURE>` / `--disable <FEATURE>` - Override tier defaults (repeatable, comma-separated)
//! - `--config <FILE>` - Project file; `tiergen.toml` in the working directory is used when present
//! - `--dry-run` - Show what would be written
//! - `--validate` / `--fail-on-invalid` - Run the project checks afterwards
//!
//! ### `migrate`, `update`, `customize`
//!
//! Re-render an existing project. Files you edited are never overwritten;
//! files both you and the templates changed are reported and the command
//! exits with code 3.
//!
//! ```bash
//! tiergen migrate --project orders --tier advanced --write-proposed
//! tiergen update --project orders
//! tiergen customize --project orders --enable kubernetes-manifests
//! ```
//!
//! ### `template`, `validate`, `tiers`
//!
//! ```bash
//! tiergen template list --tier advanced
//! tiergen template show health-handler
//! tiergen validate --project orders --timeout 60
//! tiergen tiers
//! ```
//!
//! ## Global Options
//!
//! - `--templates <DIR>` (or `TIERGEN_TEMPLATES`) - Use a template directory instead of the built-in set
//! - `--verbose` - Debug logging
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | Complete |
//! | 1 | Fatal error |
//! | 2 | Invalid configuration |
//! | 3 | Migration finished with conflicts |
//! | 4 | Validation failed |
//! | 5 | Project already exists |

mod commands;


pub use commands::{exit_code_for, run_cli, Cli, Commands, FeatureFlags, TemplateCommands};
