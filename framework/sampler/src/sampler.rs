use std::time::Duration;

use crate::probe::{CpuTimes, MemoryUsage, ProbeError, ProcessProbe, ResourceSample, SysinfoProbe};
use crate::process::SupervisedProcess;

/// How often the process tree is sampled unless configured otherwise.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// The highest resource usage seen while a process ran.
///
/// CPU and memory are two snapshots with their own trigger. The CPU snapshot is replaced, user and
/// system time together, whenever a tick's user time exceeds the current snapshot's user time. The
/// memory snapshot is replaced, resident and virtual together, whenever a tick's resident memory
/// exceeds the current snapshot's resident memory. The system time and virtual memory reported are
/// therefore those of the winning tick, not their own maxima.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourcePeaks {
    pub cpu: CpuTimes,
    pub memory: MemoryUsage,
}

impl ResourcePeaks {
    /// Fold one tick into the peaks.
    pub fn observe(&mut self, sample: &ResourceSample) {
        if sample.cpu.user_secs > self.cpu.user_secs {
            self.cpu = sample.cpu;
        }
        if sample.memory.resident_bytes > self.memory.resident_bytes {
            self.memory = sample.memory;
        }
    }
}

/// The result of supervising a process to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOutcome {
    pub exit_code: i32,
    /// [None] when the host could not be instrumented or no tick produced a sample.
    pub peaks: Option<ResourcePeaks>,
    /// The number of ticks that produced a sample.
    pub samples: usize,
}

/// Supervise a process until it exits, tracking the peak resource usage of its process tree.
///
/// Sampling happens on the calling thread between sleeps, while the supervised process runs
/// independently.
pub struct ResourceSampler<P> {
    probe: Option<P>,
    interval: Duration,
}

impl ResourceSampler<SysinfoProbe> {
    /// A sampler for the current host, or one that only waits for exit if the host cannot be
    /// instrumented.
    pub fn for_host() -> Self {
        if SysinfoProbe::is_supported() {
            Self::new(SysinfoProbe::new())
        } else {
            log::warn!(
                "Resource usage cannot be sampled on this system. The benchmark will run, but CPU and memory metrics will not be available."
            );
            Self::unavailable()
        }
    }
}

impl<P: ProcessProbe> ResourceSampler<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe: Some(probe),
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// A sampler that waits for the process to exit and reports no resource data.
    pub fn unavailable() -> Self {
        Self {
            probe: None,
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_available(&self) -> bool {
        self.probe.is_some()
    }

    /// Block until `process` exits, sampling its process tree every interval while it is alive.
    ///
    /// Ticks where the stats cannot be read are skipped. If no tick produced a sample, for example
    /// because the process exited before the first one, no peaks are reported. Only failing to wait
    /// on the process itself is an error.
    pub fn monitor<S: SupervisedProcess>(
        &mut self,
        process: &mut S,
    ) -> std::io::Result<MonitorOutcome> {
        let Some(probe) = self.probe.as_mut() else {
            let exit_code = process.wait()?;
            return Ok(MonitorOutcome {
                exit_code,
                peaks: None,
                samples: 0,
            });
        };

        let pid = process.id();
        let mut peaks = ResourcePeaks::default();
        let mut samples = 0;

        let exit_code = loop {
            if let Some(exit_code) = process.try_wait()? {
                break exit_code;
            }

            match probe.sample_tree(pid) {
                Ok(sample) => {
                    peaks.observe(&sample);
                    samples += 1;
                    log::trace!("Sampled process tree of {pid}: {sample:?}");
                }
                Err(e @ (ProbeError::AccessDenied(_) | ProbeError::NotFound(_))) => {
                    log::debug!("Skipping sample of process tree {pid}: {e}");
                }
                Err(e) => {
                    log::warn!("Failed to sample process tree {pid}: {e}");
                }
            }

            std::thread::sleep(self.interval);
        };

        log::debug!("Process {pid} exited with code {exit_code} after {samples} samples");

        Ok(MonitorOutcome {
            exit_code,
            peaks: (samples > 0).then_some(peaks),
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    fn sample(user: f64, system: f64, resident: u64, virt: u64) -> ResourceSample {
        ResourceSample {
            cpu: CpuTimes {
                user_secs: user,
                system_secs: system,
            },
            memory: MemoryUsage {
                resident_bytes: resident,
                virtual_bytes: virt,
            },
        }
    }

    /// Replays a fixed sequence of tick results.
    struct ScriptedProbe {
        ticks: VecDeque<Result<ResourceSample, ProbeError>>,
    }

    impl ProcessProbe for ScriptedProbe {
        fn sample_tree(&mut self, _pid: u32) -> Result<ResourceSample, ProbeError> {
            self.ticks.pop_front().unwrap_or(Err(ProbeError::NotFound(1)))
        }
    }

    /// Alive for a fixed number of polls, then exits with the given code.
    struct FakeProcess {
        polls_left: usize,
        exit_code: i32,
    }

    impl SupervisedProcess for FakeProcess {
        fn id(&self) -> u32 {
            1
        }

        fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
            if self.polls_left == 0 {
                Ok(Some(self.exit_code))
            } else {
                self.polls_left -= 1;
                Ok(None)
            }
        }

        fn wait(&mut self) -> std::io::Result<i32> {
            self.polls_left = 0;
            Ok(self.exit_code)
        }
    }

    #[test]
    fn cpu_and_memory_peaks_have_independent_triggers() {
        let mut peaks = ResourcePeaks::default();

        peaks.observe(&sample(1.0, 5.0, 300, 3000));
        peaks.observe(&sample(2.0, 0.5, 100, 9000));
        peaks.observe(&sample(1.5, 9.0, 200, 1000));

        // System time follows the tick with the highest user time.
        pretty_assertions::assert_eq!(
            peaks,
            ResourcePeaks {
                cpu: CpuTimes {
                    user_secs: 2.0,
                    system_secs: 0.5,
                },
                // Virtual memory follows the tick with the highest resident memory.
                memory: MemoryUsage {
                    resident_bytes: 300,
                    virtual_bytes: 3000,
                },
            }
        );
    }

    #[test]
    fn peak_user_cpu_never_decreases() {
        let user_times = [0.5, 3.0, 1.0, 0.0, 3.0, 7.5, 2.0];
        let mut peaks = ResourcePeaks::default();
        let mut previous = 0.0;

        for user in user_times {
            peaks.observe(&sample(user, 0.0, 0, 0));
            assert!(peaks.cpu.user_secs >= previous);
            previous = peaks.cpu.user_secs;
        }

        assert_eq!(peaks.cpu.user_secs, 7.5);
    }

    #[test]
    fn denied_ticks_are_skipped() {
        let mut sampler = ResourceSampler::new(ScriptedProbe {
            ticks: VecDeque::from([
                Ok(sample(1.0, 1.0, 10, 10)),
                Err(ProbeError::AccessDenied(1)),
                Ok(sample(2.0, 1.0, 20, 20)),
            ]),
        })
        .with_interval(Duration::ZERO);
        let mut process = FakeProcess {
            polls_left: 3,
            exit_code: 0,
        };

        let outcome = sampler.monitor(&mut process).unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.samples, 2);
        let peaks = outcome.peaks.unwrap();
        assert_eq!(peaks.cpu.user_secs, 2.0);
        assert_eq!(peaks.memory.resident_bytes, 20);
    }

    #[test]
    fn exit_code_is_reported() {
        let mut sampler = ResourceSampler::new(ScriptedProbe {
            ticks: VecDeque::new(),
        })
        .with_interval(Duration::ZERO);
        let mut process = FakeProcess {
            polls_left: 2,
            exit_code: 17,
        };

        let outcome = sampler.monitor(&mut process).unwrap();

        assert_eq!(outcome.exit_code, 17);
    }

    #[test]
    fn no_peaks_without_samples() {
        let mut sampler = ResourceSampler::new(ScriptedProbe {
            ticks: VecDeque::from([
                Err(ProbeError::AccessDenied(1)),
                Err(ProbeError::AccessDenied(1)),
            ]),
        })
        .with_interval(Duration::ZERO);
        let mut process = FakeProcess {
            polls_left: 2,
            exit_code: 0,
        };

        let outcome = sampler.monitor(&mut process).unwrap();

        assert_eq!(outcome.samples, 0);
        assert_eq!(outcome.peaks, None);
    }

    #[test]
    fn no_peaks_when_process_exits_before_first_tick() {
        let mut sampler = ResourceSampler::new(ScriptedProbe {
            ticks: VecDeque::from([Ok(sample(1.0, 1.0, 10, 10))]),
        })
        .with_interval(Duration::ZERO);
        let mut process = FakeProcess {
            polls_left: 0,
            exit_code: 0,
        };

        let outcome = sampler.monitor(&mut process).unwrap();

        assert_eq!(outcome.samples, 0);
        assert_eq!(outcome.peaks, None);
    }

    #[test]
    fn unavailable_sampler_only_waits() {
        let mut sampler = ResourceSampler::<ScriptedProbe>::unavailable();
        let mut process = FakeProcess {
            polls_left: 100,
            exit_code: 2,
        };

        let outcome = sampler.monitor(&mut process).unwrap();

        assert!(!sampler.is_available());
        assert_eq!(outcome.exit_code, 2);
        assert_eq!(outcome.peaks, None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn monitor_real_process_tree() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "sleep 1 & sleep 1; wait"])
            .spawn()
            .unwrap();

        let mut sampler = ResourceSampler::for_host().with_interval(Duration::from_millis(100));
        let outcome = sampler.monitor(&mut child).unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.samples > 0);
        assert!(outcome.peaks.unwrap().memory.resident_bytes > 0);
    }
}
