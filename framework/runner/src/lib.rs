mod config;
mod executor;
mod launcher;
mod machine;
mod patcher;
mod progress;
mod sink;
mod sweep;
mod target;

pub mod prelude {
    pub use crate::config::{
        benchmark_file, BenchConfig, BuildSettings, ConfigError, Directories, Files,
        GeneralSettings, LauncherSettings, OutputSettings, TestSettings, VariableNames,
    };
    pub use crate::executor::{CommandSpec, ExecutorError, LaunchSpec, RunExecutor};
    pub use crate::launcher::{resolve_program, resolve_program_in};
    pub use crate::machine::machine_descriptor;
    pub use crate::patcher::{ConfigPatcher, SettingsPatcher, NUM_PLAYERS_SETTING};
    pub use crate::progress::SweepProgress;
    pub use crate::sink::{CsvSink, JsonlSink, MetricsSink, METRICS_COLUMNS};
    pub use crate::sweep::{
        analyse_message_log, log_correlation, message_counts, RunIds, RunPhase, RunResult,
        SweepDriver, SweepReport,
    };
    pub use crate::target::{BenchTarget, ProcessTarget};
}
