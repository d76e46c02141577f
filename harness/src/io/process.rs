//! Child process execution with an optional timeout and bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long to keep draining pipes after a timed-out child was killed.
/// Descendants that escaped the kill may hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

type ReaderHandle = thread::JoinHandle<Result<(Vec<u8>, usize)>>;

/// Run a command, killing it if `timeout` elapses first.
///
/// `None` waits indefinitely. Output is drained concurrently so a chatty child
/// cannot deadlock on a full pipe; at most `output_limit_bytes` of each stream
/// is kept and the rest is counted and discarded.
///
/// On Unix the child leads its own process group and a timeout kills the whole
/// group, so helpers the agent started do not outlive the turn.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                kill_tree(&mut child)?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let drain_deadline = timed_out.then(|| Instant::now() + DRAIN_GRACE);
    let (stdout, stdout_truncated) =
        join_output(stdout_handle, drain_deadline).context("join stdout")?;
    let (stderr, stderr_truncated) =
        join_output(stderr_handle, drain_deadline).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    // The child's pid is its process group id; a negative pid targets the group.
    let group = format!("-{}", child.id());
    match Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            debug!(code = ?status.code(), "group kill failed; killing child only");
            child.kill().context("kill command")
        }
        Err(err) => {
            debug!(err = %err, "group kill unavailable; killing child only");
            child.kill().context("kill command")
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Join a reader thread. With a deadline, a reader still blocked when it
/// passes is abandoned and its stream reported empty.
fn join_output(handle: ReaderHandle, deadline: Option<Instant>) -> Result<(Vec<u8>, usize)> {
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("output pipe still held open after kill; abandoning reader");
                return Ok((Vec::new(), 0));
            }
            thread::sleep(DRAIN_POLL);
        }
    }
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
