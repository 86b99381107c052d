//! Child process wrapper for a running stream
//!
//! A spawned stream is split in two halves: [`StreamProcess`] is the cheap,
//! cloneable handle stored in the supervisor's process table (pid, run id,
//! signalling, exit observation), and [`ProcessMonitor`] owns the child and
//! publishes its exit. Exit publication happens in two phases so that `stop`
//! can wait until the supervisor has fully processed the exit event.

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{StreamError, StreamResult};

/// Longest partial line kept while waiting for a delimiter
const MAX_LINE_BYTES: usize = 64 * 1024;

/// How a process ended, as observed by the operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Clean,
    Crash,
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }

    /// Used when the exit status could not be collected
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    /// Exit code 0, or a polite termination request, counts as clean. Anything
    /// else (fatal signals, non-zero codes, unknown status) is a crash.
    pub fn kind(&self) -> ExitKind {
        match (self.code, self.signal) {
            (_, Some(signal)) if signal == Signal::SIGTERM as i32 || signal == Signal::SIGINT as i32 => {
                ExitKind::Clean
            }
            (Some(0), None) => ExitKind::Clean,
            _ => ExitKind::Crash,
        }
    }

    pub fn to_error(&self) -> StreamError {
        match self.kind() {
            ExitKind::Clean => StreamError::CleanExit,
            ExitKind::Crash => StreamError::CrashExit {
                code: self.code,
                signal: self.signal,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    Running,
    /// The child has been reaped
    Exited(ExitOutcome),
    /// The supervisor finished handling the exit
    Settled(ExitOutcome),
}

/// Handle to a tracked stream process
#[derive(Debug, Clone)]
pub struct StreamProcess {
    run_id: Uuid,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    phase: watch::Receiver<ProcessPhase>,
}

/// Owner of the child; drives exit publication
pub struct ProcessMonitor {
    child: Child,
    phase: watch::Sender<ProcessPhase>,
}

pub struct SpawnedProcess {
    pub process: StreamProcess,
    pub monitor: ProcessMonitor,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Spawn `program args...` with piped output and a null stdin.
pub fn spawn(program: &str, args: &[String]) -> StreamResult<SpawnedProcess> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(StreamError::Spawn)?;
    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (tx, rx) = watch::channel(ProcessPhase::Running);

    debug!("Spawned {} (pid: {:?})", program, pid);

    Ok(SpawnedProcess {
        process: StreamProcess {
            run_id: Uuid::new_v4(),
            pid,
            started_at: Utc::now(),
            phase: rx,
        },
        monitor: ProcessMonitor { child, phase: tx },
        stdout,
        stderr,
    })
}

impl StreamProcess {
    /// Distinguishes successive processes of the same job
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn has_exited(&self) -> bool {
        !matches!(*self.phase.borrow(), ProcessPhase::Running)
    }

    /// The exit has been reaped and handled
    pub fn is_settled(&self) -> bool {
        matches!(*self.phase.borrow(), ProcessPhase::Settled(_))
    }

    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        match *self.phase.borrow() {
            ProcessPhase::Running => None,
            ProcessPhase::Exited(outcome) | ProcessPhase::Settled(outcome) => Some(outcome),
        }
    }

    /// Ask the process to stop (SIGTERM).
    pub fn terminate(&self) -> StreamResult<()> {
        self.send_signal(Signal::SIGTERM)
    }

    /// Force the process down (SIGKILL).
    pub fn kill(&self) -> StreamResult<()> {
        self.send_signal(Signal::SIGKILL)
    }

    fn send_signal(&self, signal: Signal) -> StreamResult<()> {
        // A reaped pid may already belong to someone else
        if self.has_exited() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let raw = i32::try_from(pid).map_err(|_| StreamError::Signal {
            pid,
            message: "pid out of range".to_string(),
        })?;

        match kill(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(StreamError::Signal {
                pid,
                message: errno.to_string(),
            }),
        }
    }

    /// Wait until the exit has been fully handled. Returns `false` on timeout.
    pub async fn wait_settled(&self, timeout: Duration) -> bool {
        let mut phase = self.phase.clone();
        let settled = tokio::time::timeout(timeout, async move {
            phase
                .wait_for(|p| matches!(p, ProcessPhase::Settled(_)))
                .await
                .is_ok()
        })
        .await;
        matches!(settled, Ok(true))
    }
}

impl ProcessMonitor {
    /// Wait for the child to exit and publish the outcome.
    pub async fn wait(&mut self) -> ExitOutcome {
        let outcome = match self.child.wait().await {
            Ok(status) => ExitOutcome::from_status(status),
            Err(e) => {
                warn!("Failed to collect stream process exit status: {}", e);
                ExitOutcome::unknown()
            }
        };
        self.phase.send_replace(ProcessPhase::Exited(outcome));
        outcome
    }

    /// Mark the exit as handled, releasing anyone blocked in `wait_settled`.
    pub fn settle(self, outcome: ExitOutcome) {
        self.phase.send_replace(ProcessPhase::Settled(outcome));
    }
}

/// Splits process output into lines on either `\n` or `\r`.
///
/// ffmpeg rewrites its progress line with carriage returns, so a plain
/// newline reader would only see progress once the stream ends.
pub struct OutputLines<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    /// Next non-empty line, or `None` at end of stream.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_pending()));
            }

            if let Some(pos) = buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                self.pending.extend_from_slice(&buf[..pos]);
                self.reader.consume(pos + 1);
                if self.pending.is_empty() {
                    continue;
                }
                return Ok(Some(self.take_pending()));
            }

            let len = buf.len();
            let room = MAX_LINE_BYTES.saturating_sub(self.pending.len());
            self.pending.extend_from_slice(&buf[..len.min(room)]);
            self.reader.consume(len);
        }
    }

    fn take_pending(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&bytes).trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0), None, ExitKind::Clean)]
    #[case(Some(1), None, ExitKind::Crash)]
    #[case(None, Some(15), ExitKind::Clean)]
    #[case(None, Some(2), ExitKind::Clean)]
    #[case(None, Some(9), ExitKind::Crash)]
    #[case(None, Some(11), ExitKind::Crash)]
    #[case(None, None, ExitKind::Crash)]
    fn classifies_exits(#[case] code: Option<i32>, #[case] signal: Option<i32>, #[case] expected: ExitKind) {
        assert_eq!(ExitOutcome { code, signal }.kind(), expected);
    }

    #[test]
    fn crash_maps_to_crash_error() {
        let err = ExitOutcome {
            code: Some(255),
            signal: None,
        }
        .to_error();
        assert!(matches!(err, StreamError::CrashExit { code: Some(255), .. }));
    }

    #[tokio::test]
    async fn splits_on_carriage_returns_and_newlines() {
        let input: &[u8] = b"frame=  1 fps=0\rframe=  2 fps=25\r\nInput #0, mov\n\ntrailing";
        let mut lines = OutputLines::new(input);
        let mut collected = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            collected.push(line);
        }
        assert_eq!(
            collected,
            vec!["frame=  1 fps=0", "frame=  2 fps=25", "Input #0, mov", "trailing"]
        );
    }

    #[tokio::test]
    async fn reports_exit_code_of_finished_process() {
        let mut spawned = spawn("sh", &["-c".to_string(), "echo ready; exit 3".to_string()]).unwrap();
        let mut stdout = OutputLines::new(spawned.stdout.take().unwrap());

        assert_eq!(stdout.next_line().await.unwrap().as_deref(), Some("ready"));
        let outcome = spawned.monitor.wait().await;

        assert_eq!(outcome.code, Some(3));
        assert_eq!(outcome.kind(), ExitKind::Crash);
        assert!(spawned.process.has_exited());
        assert_eq!(spawned.process.exit_outcome(), Some(outcome));
    }

    #[tokio::test]
    async fn terminate_delivers_sigterm_and_settle_releases_waiters() {
        let spawned = spawn("sleep", &["30".to_string()]).unwrap();
        let SpawnedProcess {
            process,
            mut monitor,
            ..
        } = spawned;

        process.terminate().unwrap();
        let outcome = monitor.wait().await;
        assert_eq!(outcome.signal, Some(Signal::SIGTERM as i32));
        assert_eq!(outcome.kind(), ExitKind::Clean);

        assert!(!process.wait_settled(Duration::from_millis(10)).await);
        monitor.settle(outcome);
        assert!(process.wait_settled(Duration::from_secs(1)).await);

        // Signalling an exited process is a no-op
        process.kill().unwrap();
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let result = spawn("/nonexistent/stream-binary", &[]).map(|_| ());
        assert!(matches!(result, Err(StreamError::Spawn(_))));
    }
}
