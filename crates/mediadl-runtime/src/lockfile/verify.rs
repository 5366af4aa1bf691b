//! Process liveness checks.

/// Check if a PID exists.
///
/// Uses `kill` with the null signal, which checks without signalling.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // Exists but we lack permission
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub fn pid_exists(pid: u32) -> bool {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    system.process(sys_pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_exists_for_self() {
        assert!(pid_exists(std::process::id()));
    }

    #[test]
    #[cfg(unix)]
    fn pid_exists_false_for_impossible_pid() {
        assert!(!pid_exists(999_999));
    }
}
