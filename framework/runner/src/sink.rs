use std::convert::Infallible;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use game_bench_summary_model::{
    append_run_record, format_bytes, format_duration_secs, MessageCountRecord, Metric,
    MetricsRecord, RunRecord, KNOWN_TARGETS,
};

/// A trait for emitting the records of completed runs.
pub trait MetricsSink {
    type Error;

    /// Emit the record of one run.
    fn emit(&mut self, record: &RunRecord) -> Result<(), Self::Error>;
}

/// Column names of the metrics output, in order.
pub const METRICS_COLUMNS: [&str; 13] = [
    "id",
    "machine",
    "num_conns",
    "is_reliable",
    "timeout",
    "benchmark_ret_code",
    "test_ret_code",
    "cpu_time_user",
    "cpu_time_system",
    "mem_info_rss",
    "mem_info_vms",
    "avg_client_time",
    "avg_server_time",
];

/// Writes metrics and message counts to two CSV outputs, each starting with a header row.
///
/// Without a metrics output only message counts are written.
pub struct CsvSink<W: Write> {
    metrics: Option<W>,
    messages: W,
    human_readable: bool,
}

impl CsvSink<BufWriter<File>> {
    /// Create, or truncate, both CSV files and write their headers.
    pub fn create(
        metrics_path: &Path,
        messages_path: &Path,
        human_readable: bool,
    ) -> anyhow::Result<Self> {
        log::info!(
            "Writing metrics to {} and message counts to {}",
            metrics_path.display(),
            messages_path.display()
        );

        Self::new(create_csv(metrics_path)?, create_csv(messages_path)?, human_readable)
            .context("Failed to write CSV headers")
    }

    /// Create, or truncate, only the message counts CSV file and write its header.
    pub fn create_messages_only(messages_path: &Path) -> anyhow::Result<Self> {
        log::info!("Writing message counts to {}", messages_path.display());

        Self::messages_only(create_csv(messages_path)?).context("Failed to write CSV header")
    }
}

fn create_csv(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut metrics: W, messages: W, human_readable: bool) -> std::io::Result<Self> {
        write_row(&mut metrics, METRICS_COLUMNS.iter().copied())?;

        let mut sink = Self::messages_only(messages)?;
        sink.metrics = Some(metrics);
        sink.human_readable = human_readable;
        Ok(sink)
    }

    /// A sink that ignores metrics and only writes message counts.
    pub fn messages_only(mut messages: W) -> std::io::Result<Self> {
        write_row(
            &mut messages,
            ["id", "total"].into_iter().chain(KNOWN_TARGETS),
        )?;

        Ok(Self {
            metrics: None,
            messages,
            human_readable: false,
        })
    }

    /// Write a metrics row, or nothing if this sink has no metrics output.
    pub fn write_metrics(&mut self, record: &MetricsRecord) -> std::io::Result<()> {
        let Some(metrics) = self.metrics.as_mut() else {
            return Ok(());
        };
        let human_readable = self.human_readable;

        let secs = |metric: Metric<f64>| {
            if human_readable {
                metric.map(format_duration_secs).to_string()
            } else {
                metric.to_string()
            }
        };
        let bytes = |metric: Metric<u64>| {
            if human_readable {
                metric.map(format_bytes).to_string()
            } else {
                metric.to_string()
            }
        };

        let row = [
            record.id.to_string(),
            record.machine.clone(),
            record.num_conns.to_string(),
            record.is_reliable.to_string(),
            record.timeout.to_string(),
            record.benchmark_ret_code.to_string(),
            record.test_ret_code.to_string(),
            secs(record.cpu_time_user),
            secs(record.cpu_time_system),
            bytes(record.mem_info_rss),
            bytes(record.mem_info_vms),
            secs(record.avg_client_time),
            secs(record.avg_server_time),
        ];
        write_row(metrics, row.iter().map(String::as_str))?;
        metrics.flush()
    }

    /// Write a message count row. Targets outside [KNOWN_TARGETS] are not written.
    pub fn write_message_counts(&mut self, record: &MessageCountRecord) -> std::io::Result<()> {
        let row = [record.id.to_string(), record.total.to_string()]
            .into_iter()
            .chain(KNOWN_TARGETS.iter().map(|t| record.count(t).to_string()))
            .collect::<Vec<_>>();
        write_row(&mut self.messages, row.iter().map(String::as_str))?;
        self.messages.flush()
    }

    pub fn into_inner(self) -> (Option<W>, W) {
        (self.metrics, self.messages)
    }
}

impl<W: Write> MetricsSink for CsvSink<W> {
    type Error = std::io::Error;

    fn emit(&mut self, record: &RunRecord) -> Result<(), Self::Error> {
        self.write_metrics(&record.metrics)?;
        self.write_message_counts(&record.messages)
    }
}

fn write_row<'a, W: Write>(
    writer: &mut W,
    fields: impl IntoIterator<Item = &'a str>,
) -> std::io::Result<()> {
    let row = fields.into_iter().map(csv_field).collect::<Vec<_>>();
    writeln!(writer, "{}", row.join(","))
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Appends every run record to a JSON lines file for later summarising.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsSink for JsonlSink {
    type Error = anyhow::Error;

    fn emit(&mut self, record: &RunRecord) -> Result<(), Self::Error> {
        append_run_record(record, &self.path)
            .with_context(|| format!("Failed to append run record to {}", self.path.display()))
    }
}

/// Collects the records in memory.
impl MetricsSink for Vec<RunRecord> {
    type Error = Infallible;

    fn emit(&mut self, record: &RunRecord) -> Result<(), Self::Error> {
        self.push(record.clone());
        Ok(())
    }
}

impl<S: MetricsSink> MetricsSink for Option<S> {
    type Error = S::Error;

    fn emit(&mut self, record: &RunRecord) -> Result<(), Self::Error> {
        match self {
            Some(sink) => sink.emit(record),
            None => Ok(()),
        }
    }
}

/// Emits to both sinks, stopping at the first error.
impl<A, B> MetricsSink for (A, B)
where
    A: MetricsSink,
    B: MetricsSink,
    anyhow::Error: From<A::Error> + From<B::Error>,
{
    type Error = anyhow::Error;

    fn emit(&mut self, record: &RunRecord) -> Result<(), Self::Error> {
        self.0.emit(record)?;
        self.1.emit(record)?;
        Ok(())
    }
}
