/// Resource Monitor - Timing, Memory and Hard Timeouts
///
/// **Core Responsibility:**
/// Start one execution unit, race it against the time limit, and turn whatever
/// comes back into an [`ExecutionResult`].
///
/// **Guarantees:**
/// - Hard timeout: the unit's whole process group is SIGKILLed when the limit
///   fires, and the unit itself is reaped
/// - No survivors: every unit leads its own process group, and the group is
///   killed again once the unit exits, so forked children cannot outlive it or
///   hold its output pipe open
/// - No leaks: the child is spawned with `kill_on_drop`, and reader tasks that
///   miss the drain grace period are aborted
/// - No misattribution: output of a killed unit is discarded
/// - Never fails: spawn errors, crashes and garbled output become runtime errors
///
/// **Measurements:**
/// - `runtime_ms`: the unit's own monotonic measurement of the invocation when
///   reported, else wall clock around the whole unit
/// - `memory_kb`: `max(0, end - start)` of the in-unit snapshots (V8 heap for
///   node, peak RSS for python). Best-effort and noisy: GC timing, allocator
///   reuse and JIT warmup all move it. It is not an enforcement mechanism.

use crate::adapter::UnitCommand;
use crate::protocol::{self, UnitErrorPhase, UnitFrame};
use arbiter_common::types::{ErrorPhase, ExecutionLimits, ExecutionResult};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// stderr kept for diagnostics
const STDERR_CAPTURE_BYTES: usize = 16 * 1024;

/// How long to wait for pipes to close once the unit has exited
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

/// Read until EOF keeping at most `cap` bytes; the rest is drained and dropped
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> Captured {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.bytes.extend_from_slice(&chunk[..room]);
                    captured.overflowed = true;
                } else {
                    captured.bytes.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    captured
}

fn spawn_reader<R>(reader: Option<R>, cap: usize) -> JoinHandle<Captured>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match reader {
            Some(reader) => read_capped(reader, cap).await,
            None => Captured::default(),
        }
    })
}

async fn drain(mut task: JoinHandle<Captured>) -> Option<Captured> {
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(captured)) => Some(captured),
        Ok(Err(_)) => None,
        Err(_) => {
            task.abort();
            None
        }
    }
}

/// SIGKILL whatever is left in the unit's process group
#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        // Group already empty
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill execution unit process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

/// How a unit ended, before frames are interpreted
#[derive(Debug)]
pub(crate) enum UnitRun {
    /// The unit exited and its last frame decoded cleanly
    Frame { frame: UnitFrame, wall_ms: f64 },
    /// Spawn failure, timeout, crash or unusable output
    Failed(ExecutionResult),
}

#[derive(Debug, Clone)]
pub struct ResourceMonitor {
    max_output_bytes: usize,
}

impl ResourceMonitor {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// Run one unit under `limits`
    pub async fn run(&self, unit: UnitCommand, limits: &ExecutionLimits) -> ExecutionResult {
        match self.run_unit(unit, limits).await {
            UnitRun::Frame { frame, wall_ms } => Self::result_from_frame(frame, wall_ms),
            UnitRun::Failed(result) => result,
        }
    }

    pub(crate) async fn run_unit(&self, unit: UnitCommand, limits: &ExecutionLimits) -> UnitRun {
        let started = Instant::now();

        let mut command = Command::new(&unit.program);
        command.args(&unit.args).env_clear();
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }
        command
            .envs(unit.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %unit.program, error = %e, "Failed to spawn execution unit");
                return UnitRun::Failed(ExecutionResult::failure(
                    ErrorPhase::Runtime,
                    format!("Failed to start runtime '{}': {}", unit.program, e),
                ));
            }
        };
        // Leader of its own group, so the group id is the pid
        let pgid = child.id();

        let stdin = child.stdin.take();
        let payload = unit.stdin;
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                // A unit that exits before reading its request closes the pipe
                let _ = stdin.write_all(&payload).await;
                let _ = stdin.shutdown().await;
            }
        });
        let stdout_task = spawn_reader(child.stdout.take(), self.max_output_bytes);
        let stderr_task = spawn_reader(child.stderr.take(), STDERR_CAPTURE_BYTES);

        let time_limit = Duration::from_millis(limits.time_limit_ms);
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(time_limit) => None,
        };
        let wall_ms = started.elapsed().as_secs_f64() * 1000.0;

        let status = match waited {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                warn!(error = %e, "Failed to wait for execution unit");
                kill_process_group(pgid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill execution unit");
                }
                writer.abort();
                stdout_task.abort();
                stderr_task.abort();
                return UnitRun::Failed(ExecutionResult {
                    runtime_ms: wall_ms,
                    ..ExecutionResult::failure(
                        ErrorPhase::Runtime,
                        format!("Failed to wait for execution unit: {}", e),
                    )
                });
            }
            None => {
                debug!(
                    time_limit_ms = limits.time_limit_ms,
                    elapsed_ms = wall_ms,
                    "Time limit reached, killing execution unit"
                );
                kill_process_group(pgid);
                // kill() sends SIGKILL and reaps the child
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out execution unit");
                }
                writer.abort();
                stdout_task.abort();
                stderr_task.abort();
                return UnitRun::Failed(ExecutionResult::time_limit_exceeded(limits.time_limit_ms));
            }
        };

        // Forked children still hold the pipes open until they are gone
        kill_process_group(pgid);
        let _ = writer.await;
        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await.unwrap_or_default();
        let stderr_text = String::from_utf8_lossy(&stderr.bytes).trim().to_string();

        debug!(
            status = %status,
            elapsed_ms = wall_ms,
            stdout_bytes = stdout.as_ref().map(|c| c.bytes.len()).unwrap_or(0),
            stderr_bytes = stderr.bytes.len(),
            "Execution unit exited"
        );

        let Some(stdout) = stdout else {
            return UnitRun::Failed(
                ExecutionResult {
                    runtime_ms: wall_ms,
                    ..ExecutionResult::failure(
                        ErrorPhase::Runtime,
                        "Output stream was not closed by the execution unit",
                    )
                }
                .with_detail(stderr_text),
            );
        };

        if stdout.overflowed {
            return UnitRun::Failed(ExecutionResult {
                runtime_ms: wall_ms,
                ..ExecutionResult::failure(ErrorPhase::Runtime, "Output Limit Exceeded")
            });
        }

        let frames = match protocol::decode_frames(&stdout.bytes) {
            Ok(frames) => frames,
            Err(e) => {
                return UnitRun::Failed(
                    ExecutionResult {
                        runtime_ms: wall_ms,
                        ..ExecutionResult::failure(
                            ErrorPhase::Runtime,
                            format!("Malformed output from execution unit: {:#}", e),
                        )
                    }
                    .with_detail(stderr_text),
                );
            }
        };

        match frames.into_iter().last() {
            Some(frame) => UnitRun::Frame { frame, wall_ms },
            None => UnitRun::Failed(
                ExecutionResult {
                    runtime_ms: wall_ms,
                    ..ExecutionResult::failure(
                        ErrorPhase::Runtime,
                        format!("Process exited with {}", status),
                    )
                }
                .with_detail(stderr_text),
            ),
        }
    }

    pub(crate) fn result_from_frame(frame: UnitFrame, wall_ms: f64) -> ExecutionResult {
        match frame {
            UnitFrame::Result {
                return_value,
                stdout,
                memory,
                elapsed_ns,
            } => ExecutionResult {
                return_value: Some(return_value),
                stdout,
                runtime_ms: elapsed_ns.map(|ns| ns / 1_000_000.0).unwrap_or(wall_ms),
                memory_kb: memory.map(|m| m.delta_kb()).unwrap_or(0.0),
                ..Default::default()
            },
            UnitFrame::Error {
                phase,
                message,
                detail,
                stdout,
            } => {
                let phase = match phase {
                    UnitErrorPhase::Compile => ErrorPhase::Compile,
                    UnitErrorPhase::Runtime => ErrorPhase::Runtime,
                };
                ExecutionResult {
                    stdout,
                    runtime_ms: wall_ms,
                    ..ExecutionResult::failure(phase, message)
                }
                .with_detail(detail.unwrap_or_default())
            }
            UnitFrame::Transpiled { .. } => ExecutionResult {
                runtime_ms: wall_ms,
                ..ExecutionResult::failure(
                    ErrorPhase::Runtime,
                    "Execution unit answered with a transpiled frame",
                )
            },
        }
    }
}
