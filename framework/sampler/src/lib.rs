mod probe;
mod process;
mod sampler;

pub mod prelude {
    pub use crate::probe::{
        CpuTimes, MemoryUsage, ProbeError, ProcessProbe, ResourceSample, SysinfoProbe,
    };
    pub use crate::process::{exit_code, SupervisedProcess};
    pub use crate::sampler::{
        MonitorOutcome, ResourcePeaks, ResourceSampler, DEFAULT_SAMPLE_INTERVAL,
    };
}
