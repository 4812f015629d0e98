use std::process::{Child, ExitStatus};

/// A running process that can be supervised until it exits.
pub trait SupervisedProcess {
    fn id(&self) -> u32;

    /// Check whether the process has exited without blocking.
    fn try_wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Block until the process exits.
    fn wait(&mut self) -> std::io::Result<i32>;
}

impl SupervisedProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(Child::try_wait(self)?.map(exit_code))
    }

    fn wait(&mut self) -> std::io::Result<i32> {
        Child::wait(self).map(exit_code)
    }
}

/// The exit code of a process.
///
/// A process terminated by a signal has no exit code, it is reported as the negated signal number.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn child_exit_code() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();

        assert_eq!(SupervisedProcess::wait(&mut child).unwrap(), 3);
    }

    #[test]
    fn killed_child_reports_negated_signal() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        child.kill().unwrap();

        // SIGKILL
        assert_eq!(SupervisedProcess::wait(&mut child).unwrap(), -9);
    }
}
