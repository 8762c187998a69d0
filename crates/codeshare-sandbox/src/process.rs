use tokio::process::Child;

/// Kill the child's whole process group, then kill and reap the child itself.
pub(crate) async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "child already gone before kill");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "failed to reap child");
    }
}

/// SIGKILL every process in the group led by `pid`.
/// The child is spawned with `process_group(0)`, so its pid is also the group id.
#[cfg(unix)]
pub(crate) fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    if pgid <= 1 {
        return;
    }

    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid targets the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already empty.
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn kill_group_ignores_missing_pid() {
        kill_group(None);
        kill_group(Some(0));
        kill_group(Some(1));
    }

    #[tokio::test]
    async fn terminate_kills_and_reaps() {
        let mut cmd = tokio::process::Command::new("sleep");
        cmd.arg("30").process_group(0);
        let mut child = cmd.spawn().unwrap();
        let pid = child.id();

        terminate(&mut child, pid).await;

        // Reaped: a second wait returns the cached status immediately.
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
