mod format;
mod metric;

use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

pub use format::{format_bytes, format_duration_secs};
pub use metric::{Metric, NOT_AVAILABLE};

/// Message targets that always get a column in the message count output, in column order.
///
/// Targets outside this list are still counted and kept in [MessageCountRecord::counts].
pub const KNOWN_TARGETS: [&str; 26] = [
    "ACK",
    "ALERT",
    "BYE",
    "DATA",
    "ERR",
    "GAMECOMMAND",
    "HI",
    "JOIN",
    "LANG",
    "LOG",
    "MCONNECT",
    "MDISCONNECT",
    "MLIST",
    "MRECONNECT",
    "PCONNECT",
    "PDISCONNECT",
    "PLAYER_UPDATE",
    "PLIST",
    "PRECONNECT",
    "REDIRECT",
    "SERVERCOMMAND",
    "SETUP",
    "STAGE",
    "STAGE_LEVEL",
    "TXT",
    "WARN",
];

/// The flat metrics of a single run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    /// The unique run id
    ///
    /// Microseconds since the Unix epoch at the time the run started.
    pub id: i64,
    /// Description of the machine the benchmark ran on
    pub machine: String,
    /// The number of simultaneous connections
    pub num_conns: u32,
    /// Whether reliable messaging was enabled
    pub is_reliable: bool,
    /// The retry timeout in milliseconds, only available when reliable messaging was enabled
    pub timeout: Metric<u64>,
    /// Exit code of the system under test
    pub benchmark_ret_code: i32,
    /// Exit code of the test suite
    pub test_ret_code: i32,
    /// Peak user CPU time in seconds
    pub cpu_time_user: Metric<f64>,
    /// System CPU time in seconds, taken from the same sample as [MetricsRecord::cpu_time_user]
    pub cpu_time_system: Metric<f64>,
    /// Peak resident memory in bytes
    pub mem_info_rss: Metric<u64>,
    /// Virtual memory in bytes, taken from the same sample as [MetricsRecord::mem_info_rss]
    pub mem_info_vms: Metric<u64>,
    /// Average client to server delivery delay in seconds
    pub avg_client_time: Metric<f64>,
    /// Average server to client delivery delay in seconds
    pub avg_server_time: Metric<f64>,
}

impl MetricsRecord {
    /// Compute a fingerprint for the configuration this run was measured with
    ///
    /// Runs with the same fingerprint are comparable. It uses the
    ///     - Machine
    ///     - Number of connections
    ///     - Reliable messaging flag
    ///     - Timeout
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.machine.as_bytes());
        Digest::update(&mut hasher, self.num_conns.to_le_bytes());
        Digest::update(&mut hasher, [u8::from(self.is_reliable)]);
        if let Metric::Value(timeout) = self.timeout {
            Digest::update(&mut hasher, timeout.to_le_bytes());
        }

        format!("{:x}", hasher.finalize())
    }
}

/// How many messages of each target a run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageCountRecord {
    /// The run id, matching [MetricsRecord::id]
    pub id: i64,
    /// Total number of messages
    pub total: u64,
    /// Count per message target
    #[serde(flatten)]
    pub counts: BTreeMap<String, u64>,
}

impl MessageCountRecord {
    /// The count for a target, zero if it never occurred.
    pub fn count(&self, target: &str) -> u64 {
        self.counts.get(target).copied().unwrap_or_default()
    }
}

/// Everything recorded about a single run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub metrics: MetricsRecord,
    pub messages: MessageCountRecord,
}

/// Append the run record to a file
///
/// The record will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_record(run_record: &RunRecord, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_record(run_record, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run record to a writer
pub fn store_run_record<W: Write>(run_record: &RunRecord, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_record)?;
    Ok(())
}

/// Load a single run record from a reader
pub fn load_run_record<R: Read>(reader: R) -> anyhow::Result<RunRecord> {
    let reader = std::io::BufReader::new(reader);
    let run_record: RunRecord = serde_json::from_reader(reader)?;
    Ok(run_record)
}

/// Load run records from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_record].
pub fn load_run_records(path: &Path) -> anyhow::Result<Vec<RunRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunRecord = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_record(id: i64, num_conns: u32) -> RunRecord {
        RunRecord {
            metrics: MetricsRecord {
                id,
                machine: "Linux-6.1-x86_64".to_string(),
                num_conns,
                is_reliable: true,
                timeout: Metric::Value(2000),
                benchmark_ret_code: 0,
                test_ret_code: 1,
                cpu_time_user: Metric::Value(1.25),
                cpu_time_system: Metric::Value(0.5),
                mem_info_rss: Metric::NotAvailable,
                mem_info_vms: Metric::NotAvailable,
                avg_client_time: Metric::Value(0.012),
                avg_server_time: Metric::Value(0.034),
            },
            messages: MessageCountRecord {
                id,
                total: 3,
                counts: BTreeMap::from([("ACK".to_string(), 1), ("DATA".to_string(), 2)]),
            },
        }
    }

    #[test]
    fn append_and_load_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");

        append_run_record(&sample_record(1, 10), &path).unwrap();
        append_run_record(&sample_record(2, 50), &path).unwrap();

        let loaded = load_run_records(&path).unwrap();
        pretty_assertions::assert_eq!(loaded, vec![sample_record(1, 10), sample_record(2, 50)]);
    }

    #[test]
    fn message_counts_are_flattened() {
        let mut out = Vec::new();
        store_run_record(&sample_record(7, 10), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["messages"]["ACK"], 1);
        assert_eq!(value["messages"]["total"], 3);
        assert_eq!(value["metrics"]["mem_info_rss"], "N/A");

        let record = load_run_record(out.as_slice()).unwrap();
        assert_eq!(record.messages.count("DATA"), 2);
        assert_eq!(record.messages.count("HI"), 0);
    }

    #[test]
    fn fingerprint_ignores_run_identity_and_results() {
        let a = sample_record(1, 10);
        let mut b = sample_record(2, 10);
        b.metrics.cpu_time_user = Metric::Value(99.0);
        let c = sample_record(3, 50);

        assert_eq!(a.metrics.fingerprint(), b.metrics.fingerprint());
        assert_ne!(a.metrics.fingerprint(), c.metrics.fingerprint());
    }
}
