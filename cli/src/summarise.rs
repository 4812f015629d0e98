use game_bench_message_log::SummaryStats;
use game_bench_summary_model::{load_run_records, MetricsRecord, RunRecord};
use itertools::Itertools;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::SummariseArgs;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// The statistics of one metric over all runs of the same configuration.
#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Fingerprint")]
    pub fingerprint: String,
    #[tabled(rename = "Conns")]
    pub num_conns: u32,
    #[tabled(rename = "Reliable")]
    pub is_reliable: bool,
    #[tabled(rename = "Timeout")]
    pub timeout: String,
    #[tabled(rename = "Metric")]
    pub metric: &'static str,
    #[tabled(rename = "Runs")]
    pub count: usize,
    #[tabled(display = "float3")]
    pub mean: f64,
    #[tabled(display = "float3")]
    pub min: f64,
    #[tabled(display = "float3")]
    pub max: f64,
    #[tabled(display = "float3")]
    pub median: f64,
    #[tabled(display = "float3")]
    pub std: f64,
}

fn float3(n: &f64) -> String {
    format!("{n:.3}")
}

type Extract = fn(&MetricsRecord) -> Option<f64>;

const METRICS: [(&str, Extract); 4] = [
    ("cpu_time_user (s)", cpu_time_user),
    ("mem_info_rss (MiB)", mem_info_rss_mib),
    ("avg_client_time (s)", avg_client_time),
    ("avg_server_time (s)", avg_server_time),
];

fn cpu_time_user(metrics: &MetricsRecord) -> Option<f64> {
    metrics.cpu_time_user.value().copied()
}

fn mem_info_rss_mib(metrics: &MetricsRecord) -> Option<f64> {
    metrics
        .mem_info_rss
        .value()
        .map(|bytes| *bytes as f64 / BYTES_PER_MIB)
}

fn avg_client_time(metrics: &MetricsRecord) -> Option<f64> {
    metrics.avg_client_time.value().copied()
}

fn avg_server_time(metrics: &MetricsRecord) -> Option<f64> {
    metrics.avg_server_time.value().copied()
}

pub fn summarise(args: SummariseArgs) -> anyhow::Result<()> {
    log::debug!("Loading run records from {}", args.run_summary.display());
    let records = load_run_records(&args.run_summary)?;
    log::info!("Loaded {} run records", records.len());

    let rows = summary_rows(records);
    if rows.is_empty() {
        println!("No runs to summarise");
        return Ok(());
    }

    println!("{}", Table::new(rows).with(Style::modern()));
    Ok(())
}

/// Group records by configuration fingerprint and describe each metric that has values.
pub fn summary_rows(records: Vec<RunRecord>) -> Vec<SummaryRow> {
    records
        .into_iter()
        .map(|record| record.metrics)
        .into_group_map_by(MetricsRecord::fingerprint)
        .into_iter()
        .sorted_by_key(|(_, runs)| {
            let first = &runs[0];
            (
                first.machine.clone(),
                first.num_conns,
                first.is_reliable,
                first.timeout.value().copied(),
            )
        })
        .flat_map(|(fingerprint, runs)| {
            METRICS.iter().filter_map(move |&(metric, extract)| {
                let values = runs.iter().filter_map(extract).collect::<Vec<_>>();
                let stats = SummaryStats::from_samples(&values)?;
                let first = &runs[0];

                Some(SummaryRow {
                    fingerprint: fingerprint.chars().take(12).collect(),
                    num_conns: first.num_conns,
                    is_reliable: first.is_reliable,
                    timeout: first.timeout.to_string(),
                    metric,
                    count: stats.count,
                    mean: stats.mean,
                    min: stats.min,
                    max: stats.max,
                    median: stats.median,
                    std: stats.std,
                })
            })
        })
        .collect()
}
