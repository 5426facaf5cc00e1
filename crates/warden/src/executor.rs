//! Command execution with per-attempt deadlines and retry.
//!
//! The deadline-polling loop is the same shape as a conventional
//! timeout-via-`try_wait` implementation: spawn, poll `try_wait()` against an
//! `Instant` deadline, kill and collect partial output on expiry.
//!
//! Retry uses [`warden_retry`] with a `Constant` strategy and zero jitter,
//! since `on_error.retry_interval` is a fixed sleep, not a backoff curve.
//! A deadline-exceeded attempt still consumes a retry slot and is retried
//! like any other failure until `on_error.retries` is exhausted — this
//! resolves the open question of whether timeouts short-circuit retry.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use warden_retry::{RetryExecutor, RetryStrategyConfig, RetryStrategyType};
use warden_types::Action;

/// Outcome of [`run`]/[`run_containerized`]: the dispatcher persists `output`
/// and `duration` regardless of `error`, and fans out `on_error` only when
/// `error` is `Some`.
pub struct ExecutionResult {
    pub output: String,
    pub duration: String,
    pub error: Option<String>,
}

struct AttemptFailure {
    stdout: String,
    message: String,
}

fn poll_deadline(mut child: std::process::Child, deadline: Instant) -> Result<(i32, String, String), AttemptFailure> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let (stdout, stderr) = drain(&mut child);
                return Ok((status.code().unwrap_or(-1), stdout, stderr));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let (stdout, mut stderr) = drain(&mut child);
                    stderr.push_str("\ncommand timed out");
                    return Err(AttemptFailure {
                        stdout,
                        message: stderr,
                    });
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(err) => {
                return Err(AttemptFailure {
                    stdout: String::new(),
                    message: format!("failed to poll command: {err}"),
                });
            }
        }
    }
}

fn drain(child: &mut std::process::Child) -> (String, String) {
    let mut stdout_bytes = Vec::new();
    let mut stderr_bytes = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_end(&mut stdout_bytes);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_end(&mut stderr_bytes);
    }
    (
        String::from_utf8_lossy(&stdout_bytes).to_string(),
        String::from_utf8_lossy(&stderr_bytes).to_string(),
    )
}

fn run_one_attempt(
    program: &str,
    args: &[&str],
    working_dir: &Path,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<String, AttemptFailure> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command.spawn().map_err(|err| AttemptFailure {
        stdout: String::new(),
        message: format!("failed to spawn command: {err}"),
    })?;

    let deadline = Instant::now() + timeout;
    let (code, stdout, stderr) = poll_deadline(child, deadline)?;

    if code == 0 {
        Ok(stdout.trim().to_string())
    } else {
        Err(AttemptFailure {
            stdout: stdout.trim().to_string(),
            message: format!("exit code {code}: {}", stderr.trim()),
        })
    }
}

fn retry_executor(retries: u32, retry_interval: Duration) -> RetryExecutor {
    RetryExecutor::new(RetryStrategyConfig {
        strategy: RetryStrategyType::Constant,
        max_attempts: retries.saturating_add(1),
        base_delay: retry_interval,
        max_delay: retry_interval,
        jitter: 0.0,
    })
}

fn compose_failure(retries: u32, duration: Duration, failure: AttemptFailure) -> ExecutionResult {
    let formatted = warden_duration::format_run_duration(duration);
    ExecutionResult {
        output: format!(
            "error after {retries} retries in {} seconds : {} {}",
            duration.as_secs(),
            failure.stdout,
            failure.message
        ),
        duration: formatted,
        error: Some(failure.message),
    }
}

/// Run `action.cmd` under its effective shell prefix.
pub fn run(action: &Action, global_cmd_prefix: &str, working_dir: &Path, env: &[(String, String)]) -> ExecutionResult {
    let prefix = action.effective_cmd_prefix(global_cmd_prefix);
    let mut parts: Vec<&str> = prefix.split_whitespace().collect();
    let program = parts.remove(0);
    parts.push(&action.cmd);

    let start = Instant::now();
    let executor = retry_executor(action.on_error.retries, action.on_error.retry_interval);
    let result = executor.run(|_attempt| run_one_attempt(program, &parts, working_dir, env, action.timeout));

    match result {
        Ok(stdout) => ExecutionResult {
            output: stdout,
            duration: warden_duration::format_run_duration(start.elapsed()),
            error: None,
        },
        Err(failure) => compose_failure(action.on_error.retries, start.elapsed(), failure),
    }
}

/// Run `action.cmd` inside a freshly pulled container, per `action.container`.
/// `container_cmd` is the detected/configured engine binary (`docker`/`podman`).
pub fn run_containerized(
    action: &Action,
    container_cmd: &str,
    global_cmd_prefix: &str,
    working_dir: &Path,
    env: &[(String, String)],
) -> ExecutionResult {
    let prefix = action.effective_cmd_prefix(global_cmd_prefix);
    let mount = format!("{0}:{0}", working_dir.display());

    let mut args: Vec<String> = vec!["run".to_string(), "--rm".to_string(), "-v".to_string(), mount];
    if action.container.sudo {
        args.insert(0, container_cmd.to_string());
    }
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.extend(action.container.options.iter().cloned());
    args.push(action.container.image.clone());
    args.extend(prefix.split_whitespace().map(str::to_string));
    args.push(action.cmd.clone());

    let program = if action.container.sudo { "sudo" } else { container_cmd };
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let start = Instant::now();
    let executor = retry_executor(action.on_error.retries, action.on_error.retry_interval);
    let result = executor.run(|_attempt| run_one_attempt(program, &arg_refs, working_dir, &[], action.timeout));

    match result {
        Ok(stdout) => ExecutionResult {
            output: stdout,
            duration: warden_duration::format_run_duration(start.elapsed()),
            error: None,
        },
        Err(failure) => compose_failure(action.on_error.retries, start.elapsed(), failure),
    }
}
