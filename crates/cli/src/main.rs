//! logshipd: telemetry collection and durable log shipping.
//!
//! Three modes:
//! - **Daemon** (default): sampler, ingestion endpoint, store maintenance
//!   and shipper until SIGINT/SIGTERM
//! - **Immediate** (`--immediate`): seal, one upload cycle, report, exit
//! - **Dry run** (`--dry-run`): list files still to upload, exit
//!
//! Configuration comes from the environment; a configuration error exits
//! with status 1.

mod commands;
mod daemon;
mod format;
mod logging;
mod status;

use commands::{build_cli, Mode, Options};
use logship_core::LogshipConfig;
use std::process;

fn main() {
    let matches = build_cli().get_matches();
    let options = Options::from_matches(&matches);
    logging::init();

    let mut config = match LogshipConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            process::exit(1);
        }
    };
    if let Some(dir) = &options.data_dir {
        config.data_dir = dir.clone();
    }

    if options.mode == Mode::DryRun {
        exit_with(daemon::run_dry_run(config, &options).map(|()| true));
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        match options.mode {
            Mode::Immediate => daemon::run_immediate(config, &options).await,
            _ => daemon::run_daemon(config, &options).await.map(|()| true),
        }
    });
    exit_with(result);
}

fn exit_with(result: anyhow::Result<bool>) -> ! {
    match result {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(2),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "logshipd failed");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}
