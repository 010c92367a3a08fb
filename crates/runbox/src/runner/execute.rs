//! Exec step of a run
//!
//! Streams the exec session's output into bounded buffers while racing the
//! wall-clock deadline and the caller's cancellation.

use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::runner::RunError;
use crate::runner::output::OutputBuffer;
use crate::sandbox::{ContainerEngine, ContainerId, ExecId, OutputChunk, SandboxError};
use crate::types::{ExecutionResult, TIMEOUT_EXIT_CODE};

/// Appended to stderr when a run hits its wall-clock limit
pub const TIMEOUT_NOTICE: &str = "\nExecution timed out.";

/// Exit code inspections while the engine still reports the exec as running
const INSPECT_ATTEMPTS: usize = 5;

const INSPECT_RETRY_DELAY: Duration = Duration::from_millis(20);

enum Outcome {
    Finished,
    TimedOut,
}

/// Run a command in a container and shape its result
///
/// The clock starts just before the exec session is opened. A timeout is a
/// normal outcome; cancellation is returned as [`RunError::Cancelled`] without
/// inspecting the session. A limit too large to add to the clock never fires.
#[instrument(skip(engine, container, command, cancel), fields(container = %container))]
pub(crate) async fn execute<E>(
    engine: &E,
    container: &ContainerId,
    command: Vec<String>,
    time_limit: Duration,
    max_output: usize,
    cancel: &CancellationToken,
) -> Result<ExecutionResult, RunError>
where
    E: ContainerEngine + ?Sized,
{
    let started = Instant::now();
    let deadline = started.checked_add(time_limit);

    let session = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(RunError::Cancelled),
        session = engine.exec(container, command) => session.map_err(RunError::Exec)?,
    };
    let exec_id = session.id;
    let mut output = session.output;

    let mut stdout = OutputBuffer::new(max_output);
    let mut stderr = OutputBuffer::new(max_output);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("run cancelled");
            return Err(RunError::Cancelled);
        }
        collected = collect(&mut output, &mut stdout, &mut stderr) => {
            collected.map_err(RunError::Output)?;
            Outcome::Finished
        }
        _ = expire(deadline) => Outcome::TimedOut,
    };
    let time_used = started.elapsed();
    drop(output);

    let (exit_code, timed_out) = match outcome {
        Outcome::Finished => (inspect_exit_code(engine, &exec_id).await?, false),
        Outcome::TimedOut => (TIMEOUT_EXIT_CODE, true),
    };
    debug!(exit_code, timed_out, ?time_used, "exec finished");

    let mut stderr = stderr.into_string();
    if timed_out {
        stderr.push_str(TIMEOUT_NOTICE);
    }

    Ok(ExecutionResult {
        stdout: stdout.into_string(),
        stderr,
        exit_code,
        time_used,
        memory_used: 0,
        timed_out,
    })
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drain the output stream into the per-stream buffers
async fn collect(
    output: &mut BoxStream<'static, Result<OutputChunk, SandboxError>>,
    stdout: &mut OutputBuffer,
    stderr: &mut OutputBuffer,
) -> Result<(), SandboxError> {
    while let Some(chunk) = output.next().await {
        match chunk? {
            OutputChunk::Stdout(bytes) => stdout.push(&bytes),
            OutputChunk::Stderr(bytes) => stderr.push(&bytes),
        }
    }
    Ok(())
}

async fn inspect_exit_code<E>(engine: &E, exec: &ExecId) -> Result<i32, RunError>
where
    E: ContainerEngine + ?Sized,
{
    for attempt in 1..=INSPECT_ATTEMPTS {
        if let Some(code) = engine.exit_code(exec).await.map_err(RunError::Inspect)? {
            return i32::try_from(code).map_err(|_| {
                RunError::Inspect(SandboxError::Engine(format!(
                    "exec {exec} reported out-of-range exit code {code}"
                )))
            });
        }
        if attempt < INSPECT_ATTEMPTS {
            tokio::time::sleep(INSPECT_RETRY_DELAY).await;
        }
    }

    Err(RunError::Inspect(SandboxError::Engine(format!(
        "exec {exec} reported no exit code"
    ))))
}
