use clap::Parser;

use crate::cli::{Command, GameBenchCli};

mod cli;
mod run;
mod summarise;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = GameBenchCli::parse();
    match cli.command {
        Command::Run(args) => run::run(args),
        Command::Summarise(args) => summarise::summarise(args),
    }
}
