//! Host process helpers: target liveness, privilege checks and file ownership

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{chown, Gid, Pid as NixPid, Uid, User};
use perfsnap_shared::Pid;
use tracing::{debug, warn};

const PERF_EVENT_PARANOID: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Check whether `pid` names a process visible to the caller
///
/// Signal 0 performs the permission and existence checks without delivering
/// anything; `EPERM` still means the process exists.
pub fn is_alive(pid: Pid) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(NixPid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Read the kernel's `perf_event_paranoid` level
pub fn perf_event_paranoid() -> io::Result<i32> {
    let raw = fs::read_to_string(PERF_EVENT_PARANOID)?;
    raw.trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Whether a user with the given paranoid level may record another process
pub fn perf_access_allowed(paranoid: i32, root: bool) -> bool {
    root || paranoid <= -1
}

/// Whether `perf script` needs `-f` to read a recording owned by someone else
pub fn needs_force_flag(path: &Path) -> bool {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(path = %path.display(), "Ownership check failed: {}; forcing read", e);
            return true;
        }
    };
    let (uid, gid) = (Uid::effective().as_raw(), Gid::effective().as_raw());
    if meta.uid() != uid && meta.uid() != 0 {
        debug!(
            path = %path.display(),
            "Owner uid {} differs from current uid {}", meta.uid(), uid
        );
        return true;
    }
    if meta.gid() != gid && meta.gid() != 0 {
        debug!(
            path = %path.display(),
            "Owner gid {} differs from current gid {}", meta.gid(), gid
        );
        return true;
    }
    false
}

/// Name of the user who invoked us, looking through `sudo`
fn invoking_user() -> Option<String> {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|u| !u.is_empty())
}

/// Hand a file produced as root back to the invoking user
///
/// Best effort: failures are logged and otherwise ignored.
pub fn restore_ownership(path: &Path) {
    if !is_root() {
        return;
    }
    let Some(name) = invoking_user() else {
        warn!(path = %path.display(), "Cannot determine invoking user; leaving ownership as is");
        return;
    };
    match User::from_name(&name) {
        Ok(Some(user)) => match chown(path, Some(user.uid), Some(user.gid)) {
            Ok(()) => debug!(path = %path.display(), "Changed ownership to {}", name),
            Err(e) => warn!(path = %path.display(), "Failed to change ownership to {}: {}", name, e),
        },
        Ok(None) => warn!("Unknown user {}; leaving ownership as is", name),
        Err(e) => warn!("Failed to look up user {}: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_alive() {
        assert!(is_alive(std::process::id() as Pid));
    }

    #[test]
    fn test_non_positive_pids_are_not_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(-1));
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as Pid;
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_perf_access_allowed() {
        assert!(perf_access_allowed(2, true));
        assert!(perf_access_allowed(-1, false));
        assert!(!perf_access_allowed(0, false));
        assert!(!perf_access_allowed(2, false));
    }

    #[test]
    fn test_own_file_needs_no_force() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!needs_force_flag(file.path()));
    }

    #[test]
    fn test_missing_file_forces_read() {
        let dir = tempfile::tempdir().unwrap();
        assert!(needs_force_flag(&dir.path().join("perf.data")));
    }
}
