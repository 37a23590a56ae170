//! Clap command definition and option extraction.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Build the `logshipd` command.
pub fn build_cli() -> Command {
    Command::new("logshipd")
        .about("Collects telemetry into local log files and ships them to object storage")
        .arg(
            Arg::new("immediate")
                .long("immediate")
                .help("Seal the active log file, run one upload cycle, print the report and exit")
                .action(ArgAction::SetTrue)
                .conflicts_with("dry-run"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("List closed log files that are not uploaded yet; upload nothing")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-ingest")
                .long("no-ingest")
                .help("Do not start the ingestion endpoint")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-sampler")
                .long("no-sampler")
                .help("Do not start the metrics sampler")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory (overrides LOGSHIP_DATA_DIR)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print reports as JSON")
                .action(ArgAction::SetTrue),
        )
}

/// What the binary was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run every component until a shutdown signal
    Daemon,
    /// One upload cycle, then exit
    Immediate,
    /// Report pending files, then exit
    DryRun,
}

/// Options extracted from the command line.
#[derive(Debug, Clone)]
pub struct Options {
    pub mode: Mode,
    pub ingest: bool,
    pub sampler: bool,
    pub data_dir: Option<PathBuf>,
    pub json: bool,
}

impl Options {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let mode = if matches.get_flag("immediate") {
            Mode::Immediate
        } else if matches.get_flag("dry-run") {
            Mode::DryRun
        } else {
            Mode::Daemon
        };
        Options {
            mode,
            ingest: !matches.get_flag("no-ingest"),
            sampler: !matches.get_flag("no-sampler"),
            data_dir: matches.get_one::<String>("data-dir").map(PathBuf::from),
            json: matches.get_flag("json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        let matches = build_cli()
            .try_get_matches_from(std::iter::once("logshipd").chain(args.iter().copied()))
            .unwrap();
        Options::from_matches(&matches)
    }

    #[test]
    fn test_defaults_run_everything() {
        let options = parse(&[]);
        assert_eq!(options.mode, Mode::Daemon);
        assert!(options.ingest);
        assert!(options.sampler);
        assert!(options.data_dir.is_none());
    }

    #[test]
    fn test_flags() {
        let options = parse(&["--immediate", "--no-sampler", "--data-dir", "/var/lib/logship"]);
        assert_eq!(options.mode, Mode::Immediate);
        assert!(!options.sampler);
        assert!(options.ingest);
        assert_eq!(options.data_dir, Some(PathBuf::from("/var/lib/logship")));

        assert_eq!(parse(&["--dry-run", "--json"]).mode, Mode::DryRun);
    }

    #[test]
    fn test_immediate_conflicts_with_dry_run() {
        assert!(build_cli()
            .try_get_matches_from(["logshipd", "--immediate", "--dry-run"])
            .is_err());
    }
}
