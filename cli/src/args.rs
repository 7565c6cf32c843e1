//! Command-line surface

use std::path::PathBuf;

use clap::Parser;
use perfsnap_runner::RawOptions;

#[derive(Parser, Debug)]
#[command(name = "perfsnap")]
#[command(about = "Capture steady-state perf snapshots of a running process", long_about = None)]
#[command(version, allow_negative_numbers = true)]
pub struct Cli {
    /// Process ID to profile
    #[arg(long)]
    pub pid: i64,

    /// Recording length in seconds
    #[arg(long)]
    pub duration: i64,

    /// Seconds to wait before recording starts (skips warmup)
    #[arg(long, default_value_t = 0)]
    pub start_delay: i64,

    /// Options forwarded verbatim to `perf record` [default: -e cpu-clock:pp]
    #[arg(long, allow_hyphen_values = true)]
    pub perf_opts: Option<String>,

    /// Raw perf output file (timestamped if not set)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Report file (timestamped if not set)
    #[arg(long)]
    pub report_file: Option<PathBuf>,

    /// Flamegraph stack dump file (timestamped if not set)
    #[arg(long)]
    pub flamegraph_file: Option<PathBuf>,

    /// Generate a `perf report` after recording
    #[arg(long)]
    pub report: bool,

    /// Generate `perf script` output for flamegraph tooling
    #[arg(long)]
    pub flamegraph: bool,

    /// Simulate execution without running perf
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Offer to run again after each run
    #[arg(long)]
    pub interactive: bool,

    /// Settings file (TOML)
    #[arg(long, env = "PERFSNAP_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn raw_options(&self) -> RawOptions {
        RawOptions {
            pid: self.pid,
            duration: self.duration,
            start_delay: self.start_delay,
            perf_opts: self.perf_opts.clone(),
            output: self.output.clone(),
            report_file: self.report_file.clone(),
            flamegraph_file: self.flamegraph_file.clone(),
            report: self.report,
            flamegraph: self.flamegraph,
            dry_run: self.dry_run,
            verbose: self.verbose,
            logfile: self.logfile.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["perfsnap", "--pid", "42", "--duration", "5"]).unwrap();
        assert_eq!(cli.pid, 42);
        assert_eq!(cli.duration, 5);
        assert_eq!(cli.start_delay, 0);
        assert!(cli.perf_opts.is_none());
        assert!(!cli.report && !cli.flamegraph && !cli.dry_run && !cli.interactive);
    }

    #[test]
    fn test_perf_opts_may_start_with_hyphen() {
        let cli = Cli::try_parse_from([
            "perfsnap",
            "--pid",
            "42",
            "--duration",
            "5",
            "--perf-opts",
            "-F 99 -g",
        ])
        .unwrap();
        assert_eq!(cli.raw_options().perf_opts.as_deref(), Some("-F 99 -g"));
    }

    #[test]
    fn test_negative_values_reach_validation() {
        let cli = Cli::try_parse_from([
            "perfsnap",
            "--pid",
            "42",
            "--duration",
            "-1",
            "--start-delay",
            "-2",
        ])
        .unwrap();
        let raw = cli.raw_options();
        assert_eq!(raw.duration, -1);
        assert_eq!(raw.start_delay, -2);
    }

    #[test]
    fn test_pid_and_duration_required() {
        assert!(Cli::try_parse_from(["perfsnap", "--duration", "5"]).is_err());
        assert!(Cli::try_parse_from(["perfsnap", "--pid", "1"]).is_err());
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "perfsnap",
            "--pid",
            "7",
            "--duration",
            "2",
            "--start-delay",
            "1",
            "--output",
            "run.data",
            "--report-file",
            "run.txt",
            "--flamegraph-file",
            "stacks.txt",
            "--report",
            "--flamegraph",
            "--dry-run",
            "-v",
            "--logfile",
            "run.log",
        ])
        .unwrap();
        let raw = cli.raw_options();
        assert_eq!(raw.output, Some(PathBuf::from("run.data")));
        assert_eq!(raw.report_file, Some(PathBuf::from("run.txt")));
        assert_eq!(raw.flamegraph_file, Some(PathBuf::from("stacks.txt")));
        assert!(raw.report && raw.flamegraph && raw.dry_run && raw.verbose);
        assert_eq!(raw.logfile, Some(PathBuf::from("run.log")));
    }
}
