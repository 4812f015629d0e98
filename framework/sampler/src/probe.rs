use std::collections::{HashMap, VecDeque};
use std::ops::AddAssign;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// CPU time consumed, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user_secs: f64,
    pub system_secs: f64,
}

/// Memory held, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

/// Resource usage of a process, or the sum over a process tree, at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub cpu: CpuTimes,
    pub memory: MemoryUsage,
}

impl AddAssign for ResourceSample {
    fn add_assign(&mut self, other: Self) {
        self.cpu.user_secs += other.cpu.user_secs;
        self.cpu.system_secs += other.cpu.system_secs;
        self.memory.resident_bytes += other.memory.resident_bytes;
        self.memory.virtual_bytes += other.memory.virtual_bytes;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Access denied reading stats for process {0}")]
    AccessDenied(u32),
    #[error("Process {0} not found")]
    NotFound(u32),
    #[error("IO error reading process stats: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads the resource usage of a process tree.
pub trait ProcessProbe {
    /// Sum the resource usage of `pid` and every descendant that is alive right now.
    ///
    /// The descendant set is enumerated afresh on every call.
    fn sample_tree(&mut self, pid: u32) -> Result<ResourceSample, ProbeError>;
}

/// A [ProcessProbe] backed by [sysinfo].
///
/// Memory and process tree membership come from [sysinfo]. On Linux the user/system CPU split is
/// read from `/proc/<pid>/stat` because [sysinfo] only exposes the combined CPU time.
pub struct SysinfoProbe {
    system: System,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Whether the host OS can be instrumented at all.
    pub fn is_supported() -> bool {
        sysinfo::IS_SUPPORTED_SYSTEM
    }

    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
    }

    fn sample_process(&self, pid: Pid) -> Result<ResourceSample, ProbeError> {
        let process = self
            .system
            .process(pid)
            .ok_or(ProbeError::NotFound(pid.as_u32()))?;

        Ok(ResourceSample {
            cpu: cpu_times(pid, process)?,
            memory: MemoryUsage {
                resident_bytes: process.memory(),
                virtual_bytes: process.virtual_memory(),
            },
        })
    }
}

impl ProcessProbe for SysinfoProbe {
    fn sample_tree(&mut self, pid: u32) -> Result<ResourceSample, ProbeError> {
        self.refresh();

        let root = Pid::from_u32(pid);
        let mut total = self.sample_process(root)?;

        for child in descendants(&self.system, root) {
            match self.sample_process(child) {
                Ok(sample) => total += sample,
                // Exited between enumeration and sampling, it no longer contributes.
                Err(ProbeError::NotFound(gone)) => {
                    log::trace!("Descendant {gone} of {pid} exited while sampling");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }
}

/// All live descendants of `root`, excluding `root` itself and excluding threads.
fn descendants(system: &System, root: Pid) -> Vec<Pid> {
    let links = system
        .processes()
        .iter()
        .filter(|(_, process)| process.thread_kind().is_none())
        .filter_map(|(pid, process)| process.parent().map(|parent| (*pid, parent)));

    descendants_of(links, root)
}

/// Walk `(child, parent)` links breadth first from `root`.
fn descendants_of(links: impl IntoIterator<Item = (Pid, Pid)>, root: Pid) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, parent) in links {
        children.entry(parent).or_default().push(pid);
    }

    let mut found = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(next) = queue.pop_front() {
        if let Some(kids) = children.get(&next) {
            for kid in kids {
                // Guards against pid reuse creating a cycle.
                if *kid != root && !found.contains(kid) {
                    found.push(*kid);
                    queue.push_back(*kid);
                }
            }
        }
    }

    found
}

/// Kernel clock ticks per second as exposed to user space in `/proc`.
#[cfg(target_os = "linux")]
const USER_HZ: f64 = 100.0;

#[cfg(target_os = "linux")]
fn cpu_times(pid: Pid, _process: &sysinfo::Process) -> Result<CpuTimes, ProbeError> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid.as_u32())).map_err(|e| {
        match e.kind() {
            std::io::ErrorKind::NotFound => ProbeError::NotFound(pid.as_u32()),
            std::io::ErrorKind::PermissionDenied => ProbeError::AccessDenied(pid.as_u32()),
            _ => ProbeError::Io(e),
        }
    })?;

    parse_proc_stat(&stat).ok_or_else(|| {
        ProbeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Malformed /proc/{}/stat", pid.as_u32()),
        ))
    })
}

#[cfg(not(target_os = "linux"))]
fn cpu_times(_pid: Pid, process: &sysinfo::Process) -> Result<CpuTimes, ProbeError> {
    // Only the combined figure is available here, it is reported as user time.
    Ok(CpuTimes {
        user_secs: process.accumulated_cpu_time() as f64 / 1000.0,
        system_secs: 0.0,
    })
}

/// Extract `utime` and `stime` (fields 14 and 15) from the contents of `/proc/<pid>/stat`.
///
/// The command name in field 2 may contain spaces and parentheses, so fields are counted from the
/// last closing parenthesis.
#[cfg(target_os = "linux")]
fn parse_proc_stat(stat: &str) -> Option<CpuTimes> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let utime = fields.next()?.parse::<u64>().ok()?;
    let stime = fields.next()?.parse::<u64>().ok()?;

    Some(CpuTimes {
        user_secs: utime as f64 / USER_HZ,
        system_secs: stime as f64 / USER_HZ,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_samples() {
        let mut total = ResourceSample {
            cpu: CpuTimes {
                user_secs: 1.5,
                system_secs: 0.5,
            },
            memory: MemoryUsage {
                resident_bytes: 100,
                virtual_bytes: 1000,
            },
        };
        total += ResourceSample {
            cpu: CpuTimes {
                user_secs: 0.25,
                system_secs: 0.25,
            },
            memory: MemoryUsage {
                resident_bytes: 50,
                virtual_bytes: 500,
            },
        };

        assert_eq!(total.cpu.user_secs, 1.75);
        assert_eq!(total.cpu.system_secs, 0.75);
        assert_eq!(total.memory.resident_bytes, 150);
        assert_eq!(total.memory.virtual_bytes, 1500);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn parse_stat_with_awkward_command_name() {
        let stat = "4242 (node (worker) x) S 1 4242 4242 0 -1 4194304 2104 0 0 0 250 75 0 0 20 0 11 0 1234 1000000 2000 18446744073709551615";
        let times = parse_proc_stat(stat).unwrap();

        assert_eq!(times.user_secs, 2.5);
        assert_eq!(times.system_secs, 0.75);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn parse_truncated_stat() {
        assert!(parse_proc_stat("4242 (node) S 1 2 3").is_none());
        assert!(parse_proc_stat("no parenthesis at all").is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sample_own_process() {
        let mut probe = SysinfoProbe::new();
        let sample = probe
            .sample_tree(std::process::id())
            .expect("should be able to sample the test process");

        assert!(sample.memory.resident_bytes > 0);
        assert!(sample.memory.virtual_bytes >= sample.memory.resident_bytes);
    }

    fn pid(pid: u32) -> Pid {
        Pid::from_u32(pid)
    }

    #[test]
    fn descendants_include_grandchildren_but_not_root() {
        let links = [
            (pid(20), pid(10)),
            (pid(21), pid(10)),
            (pid(30), pid(20)),
            (pid(40), pid(30)),
            // Not part of the tree.
            (pid(11), pid(1)),
            (pid(10), pid(1)),
        ];

        let mut found = descendants_of(links, pid(10));
        found.sort();

        assert_eq!(found, vec![pid(20), pid(21), pid(30), pid(40)]);
    }

    #[test]
    fn descendants_survive_a_parent_cycle() {
        // The root's recorded parent is one of its own descendants after pid reuse.
        let links = [(pid(20), pid(10)), (pid(30), pid(20)), (pid(10), pid(30))];

        let mut found = descendants_of(links, pid(10));
        found.sort();

        assert_eq!(found, vec![pid(20), pid(30)]);
    }

    #[test]
    fn no_descendants() {
        assert!(descendants_of([(pid(20), pid(10))], pid(20)).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn descendants_of_real_process_tree() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "sh -c 'sleep 2; true' & sleep 2; wait"])
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        let root = Pid::from_u32(child.id());
        let found = descendants(&system, root);
        child.wait().unwrap();

        assert!(!found.contains(&root));
        // The inner shell and both sleeps.
        assert!(found.len() >= 3, "found {found:?}");
        // At least one grandchild, whose parent is not the root.
        assert!(found.iter().any(|pid| system
            .process(*pid)
            .and_then(|p| p.parent())
            .is_some_and(|parent| parent != root)));
        assert!(found
            .iter()
            .all(|pid| system.process(*pid).is_some_and(|p| p.thread_kind().is_none())));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sample_tree_includes_busy_descendant() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "while :; do :; done & sleep 2; kill $!"])
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(800));

        let mut probe = SysinfoProbe::new();
        let tree = probe.sample_tree(child.id()).unwrap();
        let root = probe.sample_process(Pid::from_u32(child.id())).unwrap();
        // The shell stops the loop itself.
        child.wait().unwrap();

        assert!(
            tree.cpu.user_secs > root.cpu.user_secs,
            "tree {tree:?}, root {root:?}"
        );
        assert!(tree.memory.resident_bytes > root.memory.resident_bytes);
    }

    #[test]
    fn sample_missing_process() {
        let mut probe = SysinfoProbe::new();
        // Far above any default pid_max.
        let result = probe.sample_tree(u32::MAX - 1);

        assert!(matches!(result, Err(ProbeError::NotFound(_))));
    }
}
