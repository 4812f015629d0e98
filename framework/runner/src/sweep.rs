use anyhow::Context;
use chrono::Utc;
use game_bench_core::prelude::{SweepPlan, SweepPoint};
use game_bench_message_log::{correlate_log, Correlation, MessageLog};
use game_bench_sampler::prelude::{MonitorOutcome, ResourcePeaks};
use game_bench_summary_model::{MessageCountRecord, Metric, MetricsRecord, RunRecord};

use crate::patcher::ConfigPatcher;
use crate::progress::SweepProgress;
use crate::sink::MetricsSink;
use crate::target::BenchTarget;

/// The steps of a single run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RunPhase {
    #[display("config patched")]
    ConfigPatched,
    #[display("launched")]
    Launched,
    #[display("monitored")]
    Monitored,
    #[display("test run")]
    TestRun,
    #[display("log parsed")]
    LogParsed,
    #[display("metrics emitted")]
    MetricsEmitted,
    #[display("done")]
    Done,
}

/// Hands out run ids, the current time in microseconds since the Unix epoch.
///
/// Ids are strictly increasing even if two runs start within the same microsecond or the clock
/// goes backwards.
#[derive(Debug, Default)]
pub struct RunIds {
    last: Option<i64>,
}

impl RunIds {
    pub fn next_id(&mut self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let id = match self.last {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last = Some(id);
        id
    }
}

/// The outcome of one completed run, before the message log is taken into account.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run_id: i64,
    pub point: SweepPoint,
    pub exit_code: i32,
    pub test_exit_code: i32,
    /// [None] when resource usage could not be sampled.
    pub peaks: Option<ResourcePeaks>,
}

impl RunResult {
    pub fn new(run_id: i64, point: SweepPoint, outcome: MonitorOutcome, test_exit_code: i32) -> Self {
        Self {
            run_id,
            point,
            exit_code: outcome.exit_code,
            test_exit_code,
            peaks: outcome.peaks,
        }
    }

    /// Flatten the result and the correlation of its message log into a record.
    pub fn into_record(self, machine: &str, correlation: Correlation) -> RunRecord {
        let peaks = self.peaks;
        let delays = correlation.delays.as_ref();

        let metrics = MetricsRecord {
            id: self.run_id,
            machine: machine.to_string(),
            num_conns: self.point.connection_count(),
            is_reliable: self.point.reliable(),
            timeout: Metric::from(
                self.point
                    .reliable()
                    .then_some(self.point.timeout_ms()),
            ),
            benchmark_ret_code: self.exit_code,
            test_ret_code: self.test_exit_code,
            cpu_time_user: peaks.map(|p| p.cpu.user_secs).into(),
            cpu_time_system: peaks.map(|p| p.cpu.system_secs).into(),
            mem_info_rss: peaks.map(|p| p.memory.resident_bytes).into(),
            mem_info_vms: peaks.map(|p| p.memory.virtual_bytes).into(),
            avg_client_time: delays.map(|d| d.client_to_server.average_secs).into(),
            avg_server_time: delays.map(|d| d.server_to_client.average_secs).into(),
        };

        RunRecord {
            metrics,
            messages: message_counts(self.run_id, correlation),
        }
    }
}

/// The message counts of a correlation, under the given id.
pub fn message_counts(id: i64, correlation: Correlation) -> MessageCountRecord {
    MessageCountRecord {
        id,
        total: correlation.counters.total(),
        counts: correlation.counters.into_counts(),
    }
}

/// Log the message frequencies and, when available, the delivery delay of a correlation.
pub fn log_correlation(correlation: &Correlation) {
    log::info!("Total messages: {}", correlation.counters.total());
    for (target, count) in correlation.counters.iter() {
        log::info!("{target}: {count}");
    }

    if let Some(delays) = &correlation.delays {
        for delay in [&delays.client_to_server, &delays.server_to_client] {
            if let Some(stats) = delay.stats() {
                log::debug!(
                    "{} delay over {} messages: mean {:.3}s, min {:.3}s, max {:.3}s, median {:.3}s, std {:.3}s",
                    delay.direction,
                    stats.count,
                    stats.mean,
                    stats.min,
                    stats.max,
                    stats.median,
                    stats.std
                );
            }
        }
        log::info!(
            "The average delay to deliver a message was {:.0} milliseconds.",
            delays.average_delivery_secs() * 1000.0
        );
    }
}

/// Summary of a completed sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Ids of the runs in the order they ran.
    pub run_ids: Vec<i64>,
    /// Runs where the system under test exited with a non-zero code.
    pub failed_runs: usize,
    /// Runs where the test suite exited with a non-zero code.
    pub failed_tests: usize,
}

/// Runs every point of a sweep in sequence and emits a record per run.
pub struct SweepDriver<T, C, S> {
    target: T,
    patcher: C,
    sink: S,
    message_log: MessageLog,
    client_role: String,
    machine: String,
    run_ids: RunIds,
}

impl<T, C, S> SweepDriver<T, C, S>
where
    T: BenchTarget,
    C: ConfigPatcher,
    S: MetricsSink,
    anyhow::Error: From<S::Error>,
{
    pub fn new(
        target: T,
        patcher: C,
        sink: S,
        message_log: MessageLog,
        client_role: impl Into<String>,
        machine: impl Into<String>,
    ) -> Self {
        Self {
            target,
            patcher,
            sink,
            message_log,
            client_role: client_role.into(),
            machine: machine.into(),
            run_ids: RunIds::default(),
        }
    }

    /// Run the whole sweep. The first fatal error aborts it.
    pub fn run(&mut self, plan: &SweepPlan, progress: &SweepProgress) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();

        log::info!("Running {} sweep points", plan.len());
        for point in plan.points() {
            progress.start_point(&point);
            let record = self
                .run_point(&point)
                .with_context(|| format!("Run failed for {point}"))?;
            progress.finish_point();

            report.run_ids.push(record.metrics.id);
            if record.metrics.benchmark_ret_code != 0 {
                report.failed_runs += 1;
            }
            if record.metrics.test_ret_code != 0 {
                report.failed_tests += 1;
            }
        }
        progress.finish();
        enter(RunPhase::Done, None);

        Ok(report)
    }

    /// Run a single sweep point through all phases and return the emitted record.
    pub fn run_point(&mut self, point: &SweepPoint) -> anyhow::Result<RunRecord> {
        self.patcher
            .set_connection_count(point.connection_count())
            .context("Failed to write the number of connections")?;
        self.patcher
            .set_reliability(point.reliable(), point.timeout_ms())
            .context("Failed to write the reliable messaging settings")?;
        self.remove_stale_log()?;
        enter(RunPhase::ConfigPatched, Some(point));

        self.target.prepare(point)?;

        let run_id = self.run_ids.next_id();
        log::info!("Running benchmark {run_id}, {point}");
        enter(RunPhase::Launched, Some(point));
        let outcome = self.target.launch(point)?;
        enter(RunPhase::Monitored, Some(point));

        let test_exit_code = self.target.run_tests(point)?;
        enter(RunPhase::TestRun, Some(point));

        let correlation = correlate_log(&self.message_log, point.reliable(), &self.client_role)?;
        log_correlation(&correlation);
        enter(RunPhase::LogParsed, Some(point));

        let record = RunResult::new(run_id, *point, outcome, test_exit_code)
            .into_record(&self.machine, correlation);
        self.sink.emit(&record)?;
        enter(RunPhase::MetricsEmitted, Some(point));

        Ok(record)
    }

    fn remove_stale_log(&self) -> anyhow::Result<()> {
        let path = self.message_log.path();
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Removed stale message log {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove message log {}", path.display())),
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn patcher(&self) -> &C {
        &self.patcher
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn enter(phase: RunPhase, point: Option<&SweepPoint>) {
    match point {
        Some(point) => log::debug!("Run phase '{phase}' for {point}"),
        None => log::debug!("Run phase '{phase}'"),
    }
}

/// Correlate an existing message log without running anything, under the given id.
pub fn analyse_message_log(
    message_log: &MessageLog,
    reliable: bool,
    client_role: &str,
    id: i64,
) -> anyhow::Result<MessageCountRecord> {
    let correlation = correlate_log(message_log, reliable, client_role)?;
    log_correlation(&correlation);
    Ok(message_counts(id, correlation))
}

#[cfg(test)]
mod tests {
    use game_bench_message_log::correlate;
    use game_bench_sampler::prelude::{CpuTimes, MemoryUsage};
    use pretty_assertions::assert_eq;

    use super::*;

    fn outcome(peaks: Option<ResourcePeaks>) -> MonitorOutcome {
        MonitorOutcome {
            exit_code: 0,
            peaks,
            samples: 3,
        }
    }

    #[test]
    fn run_ids_are_strictly_increasing() {
        let mut ids = RunIds::default();
        let mut last = ids.next_id();
        for _ in 0..1000 {
            let id = ids.next_id();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn unreliable_record_marks_missing_data() {
        let point = SweepPoint::new(10, 4000, false).unwrap();
        let result = RunResult::new(7, point, outcome(None), 1);

        let record = result.into_record("bench-01", correlate(Vec::new(), false, "ultimatum"));

        assert_eq!(record.metrics.id, 7);
        assert_eq!(record.metrics.machine, "bench-01");
        assert_eq!(record.metrics.num_conns, 10);
        assert_eq!(record.metrics.timeout, Metric::NotAvailable);
        assert_eq!(record.metrics.test_ret_code, 1);
        assert_eq!(record.metrics.cpu_time_user, Metric::NotAvailable);
        assert_eq!(record.metrics.mem_info_vms, Metric::NotAvailable);
        assert_eq!(record.metrics.avg_client_time, Metric::NotAvailable);
        assert_eq!(record.messages.id, 7);
        assert_eq!(record.messages.total, 0);
    }

    #[test]
    fn reliable_record_carries_peaks_and_delays() {
        let point = SweepPoint::new(50, 2000, true).unwrap();
        let peaks = ResourcePeaks {
            cpu: CpuTimes {
                user_secs: 2.5,
                system_secs: 0.5,
            },
            memory: MemoryUsage {
                resident_bytes: 1024,
                virtual_bytes: 4096,
            },
        };
        let result = RunResult::new(9, point, outcome(Some(peaks)), 0);

        let record = result.into_record("bench-01", correlate(Vec::new(), true, "ultimatum"));

        assert_eq!(record.metrics.timeout, Metric::Value(2000));
        assert_eq!(record.metrics.cpu_time_user, Metric::Value(2.5));
        assert_eq!(record.metrics.cpu_time_system, Metric::Value(0.5));
        assert_eq!(record.metrics.mem_info_rss, Metric::Value(1024));
        assert_eq!(record.metrics.mem_info_vms, Metric::Value(4096));
        // No pairs in an empty log, reported as zero rather than missing.
        assert_eq!(record.metrics.avg_client_time, Metric::Value(0.0));
        assert_eq!(record.metrics.avg_server_time, Metric::Value(0.0));
    }

    #[test]
    fn phases_display() {
        assert_eq!(RunPhase::ConfigPatched.to_string(), "config patched");
        assert_eq!(RunPhase::MetricsEmitted.to_string(), "metrics emitted");
    }
}
