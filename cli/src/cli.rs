use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "game-bench", about, long_about = None)]
pub struct GameBenchCli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the benchmark sweep
    Run(RunArgs),
    /// Summarise the runs recorded in a run summary file
    Summarise(SummariseArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// The benchmark configuration file
    #[clap(short, long)]
    pub config: PathBuf,

    /// The numbers of simultaneous connections to benchmark, for example `-n 10 50 100`.
    #[clap(short = 'n', long, num_args = 1.., required_unless_present = "no_run")]
    pub num_conns: Vec<u32>,

    /// Enable reliable messaging
    #[clap(short, long, default_value = "false")]
    pub reliable: bool,

    /// The retry timeouts in milliseconds to benchmark, required with `--reliable`.
    #[clap(short, long, num_args = 1..)]
    pub timeouts: Vec<u64>,

    /// Do not run the benchmark, only analyse the existing message log.
    #[clap(long, default_value = "false")]
    pub no_run: bool,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// How often to sample the resource usage of the system under test, in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub sample_interval_ms: u64,

    /// Also append every run record to this JSON lines file, for use with `summarise`.
    #[clap(long)]
    pub run_summary: Option<PathBuf>,
}

#[derive(Args)]
pub struct SummariseArgs {
    /// The JSON lines file written by `run --run-summary`
    #[clap(long)]
    pub run_summary: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<GameBenchCli, clap::Error> {
        GameBenchCli::try_parse_from(std::iter::once("game-bench").chain(args.iter().copied()))
    }

    #[test]
    fn parse_run() {
        let cli = parse(&["run", "-c", "bench.toml", "-n", "10", "50", "-r", "-t", "1000", "2000"])
            .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("Expected the run command");
        };
        assert_eq!(args.config, PathBuf::from("bench.toml"));
        assert_eq!(args.num_conns, vec![10, 50]);
        assert!(args.reliable);
        assert_eq!(args.timeouts, vec![1000, 2000]);
        assert!(!args.no_run);
        assert_eq!(args.sample_interval_ms, 1000);
        assert_eq!(args.run_summary, None);
    }

    #[test]
    fn num_conns_required_unless_no_run() {
        assert!(parse(&["run", "-c", "bench.toml"]).is_err());

        let cli = parse(&["run", "-c", "bench.toml", "--no-run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected the run command");
        };
        assert!(args.no_run);
        assert!(args.num_conns.is_empty());
    }

    #[test]
    fn reject_invalid_num_conns() {
        assert!(parse(&["run", "-c", "bench.toml", "-n", "ten"]).is_err());
    }

    #[test]
    fn parse_summarise() {
        let cli = parse(&["summarise", "--run-summary", "runs.jsonl"]).unwrap();

        let Command::Summarise(args) = cli.command else {
            panic!("Expected the summarise command");
        };
        assert_eq!(args.run_summary, PathBuf::from("runs.jsonl"));
    }
}
