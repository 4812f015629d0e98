use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use game_bench_core::prelude::SweepPlan;
use game_bench_message_log::MessageLog;
use game_bench_runner::prelude::{
    analyse_message_log, benchmark_file, machine_descriptor, BenchConfig, CsvSink, JsonlSink,
    ProcessTarget, RunExecutor, SettingsPatcher, SweepDriver, SweepProgress,
};
use game_bench_sampler::prelude::ResourceSampler;

use crate::cli::RunArgs;

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = BenchConfig::from_file(&args.config)?;

    // Names every output file of this invocation.
    let benchmark_id = Utc::now().timestamp_micros();
    log::info!("Starting benchmark {benchmark_id}");

    for dir in [&config.directories.log_dir, &config.directories.csv_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let csv_dir = &config.directories.csv_dir;
    let messages_csv = benchmark_file(csv_dir, benchmark_id, "messages", "csv");
    let message_log = MessageLog::new(config.message_log_path());

    if args.no_run {
        log::info!(
            "Not running the benchmark, analysing {}",
            message_log.path().display()
        );
        let counts =
            analyse_message_log(&message_log, args.reliable, config.client_role(), benchmark_id)?;
        let mut csv = CsvSink::create_messages_only(&messages_csv)?;
        csv.write_message_counts(&counts)
            .context("Failed to write message counts")?;
        return Ok(());
    }

    let csv = CsvSink::create(
        &benchmark_file(csv_dir, benchmark_id, "metrics", "csv"),
        &messages_csv,
        config.output.human_readable,
    )?;

    let plan = SweepPlan::new(args.num_conns, args.timeouts, args.reliable)?;

    let sampler = ResourceSampler::for_host()
        .with_interval(Duration::from_millis(args.sample_interval_ms));
    let target = ProcessTarget::from_config(&config, benchmark_id, RunExecutor::new(sampler))?;
    let patcher = SettingsPatcher::from_config(&config)?;
    let sink = (csv, args.run_summary.map(JsonlSink::new));
    let machine = machine_descriptor(config.general.machine.as_deref());
    log::info!("Benchmarking on {machine}");

    let mut driver = SweepDriver::new(
        target,
        patcher,
        sink,
        message_log,
        config.client_role(),
        machine,
    );

    let progress = if args.no_progress {
        SweepProgress::hidden()
    } else {
        SweepProgress::new(plan.len())
    };
    let report = driver.run(&plan, &progress)?;

    log::info!(
        "Benchmark {benchmark_id} finished {} runs",
        report.run_ids.len()
    );
    if report.failed_runs > 0 {
        log::warn!(
            "{} runs had a non-zero exit code, see the logs of benchmark {benchmark_id}",
            report.failed_runs
        );
    }
    if report.failed_tests > 0 {
        log::warn!("{} test runs had a non-zero exit code", report.failed_tests);
    }

    Ok(())
}
