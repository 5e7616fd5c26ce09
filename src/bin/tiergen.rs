use clap::Parser;
use std::process::ExitCode;
use tiergen::cli::{exit_code_for, run_cli, Cli};
use tiergen::error::TiergenError;
use tiergen::logging::{init_logging_with_config, LogConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env().verbose(cli.verbose);
    if let Err(err) = init_logging_with_config(&log_config) {
        eprintln!("Warning: {err:#}");
    }

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {err:#}");
            if let Some(engine) = err.downcast_ref::<TiergenError>() {
                eprintln!("💡 {}", engine.remediation());
            }
            ExitCode::from(exit_code_for(&err))
        }
    }
}
