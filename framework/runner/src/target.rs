use std::path::PathBuf;

use anyhow::Context;
use game_bench_core::prelude::SweepPoint;
use game_bench_sampler::prelude::{MonitorOutcome, ProcessProbe};

use crate::config::{benchmark_file, BenchConfig};
use crate::executor::{CommandSpec, LaunchSpec, RunExecutor};
use crate::launcher::resolve_program;

/// The system under test, as seen by the sweep.
pub trait BenchTarget {
    /// Prepare the system for a sweep point, after its settings were written.
    fn prepare(&mut self, point: &SweepPoint) -> anyhow::Result<()>;

    /// Run the system for a sweep point until it exits.
    fn launch(&mut self, point: &SweepPoint) -> anyhow::Result<MonitorOutcome>;

    /// Run the test suite and return its exit code.
    fn run_tests(&mut self, point: &SweepPoint) -> anyhow::Result<i32>;
}

/// Runs the system under test and its test suite as child processes.
pub struct ProcessTarget<P> {
    executor: RunExecutor<P>,
    launch: LaunchSpec,
    test: CommandSpec,
    build: Option<(CommandSpec, PathBuf)>,
}

impl<P: ProcessProbe> ProcessTarget<P> {
    /// Set up the commands from the configuration. Output logs are named after `benchmark_id`.
    pub fn from_config(
        config: &BenchConfig,
        benchmark_id: i64,
        executor: RunExecutor<P>,
    ) -> anyhow::Result<Self> {
        let log_dir = &config.directories.log_dir;

        let launch = LaunchSpec {
            program: resolve_program(&config.launcher.program)
                .context("Cannot find the launcher program")?,
            script: config.files.launcher_file.clone(),
            args: vec![config.general.game.clone()],
            working_dir: config.directories.launcher_cwd.clone(),
            stdout_log: benchmark_file(log_dir, benchmark_id, "stdout", "log"),
            stderr_log: benchmark_file(log_dir, benchmark_id, "stderr", "log"),
        };

        let test = CommandSpec {
            program: resolve_program(&config.test.program)
                .context("Cannot find the test program")?,
            args: config.test.args.clone(),
            cwd: config.directories.test_cwd.clone(),
        };

        let build = config
            .build
            .as_ref()
            .map(|build| -> anyhow::Result<_> {
                let spec = CommandSpec {
                    program: resolve_program(&build.program)
                        .context("Cannot find the build program")?,
                    args: build.args.clone(),
                    cwd: build.cwd.clone(),
                };
                Ok((spec, benchmark_file(log_dir, benchmark_id, "build", "log")))
            })
            .transpose()?;

        Ok(Self {
            executor,
            launch,
            test,
            build,
        })
    }
}

impl<P: ProcessProbe> BenchTarget for ProcessTarget<P> {
    fn prepare(&mut self, _point: &SweepPoint) -> anyhow::Result<()> {
        let Some((build, build_log)) = &self.build else {
            return Ok(());
        };

        log::info!("Building, output logged to {}", build_log.display());
        self.executor.run_command(build, Some(build_log))?;
        Ok(())
    }

    fn launch(&mut self, point: &SweepPoint) -> anyhow::Result<MonitorOutcome> {
        Ok(self.executor.execute(point, &self.launch)?)
    }

    fn run_tests(&mut self, _point: &SweepPoint) -> anyhow::Result<i32> {
        Ok(self.executor.run_command(&self.test, None)?)
    }
}
