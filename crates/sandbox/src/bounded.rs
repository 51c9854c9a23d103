//! Bounded subprocess execution: spawn, drain both streams, enforce a
//! wall-clock deadline, and kill the child if the deadline fires.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// A fully resolved command line, ready to spawn.
#[derive(Clone, Debug)]
pub struct ExecSpec {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub exit_ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// Run `spec` to completion or until `deadline` elapses.
///
/// The child is spawned with kill-on-drop so an abandoned future (operator
/// cancellation) tears the process down as well. A timeout is reported in
/// the output, not as an error; spawn failures are errors.
pub async fn run_bounded(spec: &ExecSpec, deadline: Duration) -> std::io::Result<ExecOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = tokio::spawn(drain(stdout));
    let stderr_task = tokio::spawn(drain(stderr));

    let waited = timeout(deadline, child.wait()).await;
    let (stdout, stderr) = match &waited {
        Ok(_) => (
            stdout_task.await.unwrap_or_default(),
            stderr_task.await.unwrap_or_default(),
        ),
        Err(_) => {
            // Deadline fired: kill first so the drain tasks see EOF.
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            (String::new(), String::new())
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;

    match waited {
        Ok(status) => {
            let status = status?;
            Ok(ExecOutput {
                exit_code: status.code().unwrap_or(-1),
                exit_ok: status.success(),
                stdout,
                stderr,
                duration_ms,
                timed_out: false,
            })
        }
        Err(_) => Ok(ExecOutput {
            exit_code: -1,
            exit_ok: false,
            stdout,
            stderr,
            duration_ms,
            timed_out: true,
        }),
    }
}

async fn drain<R>(reader: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut captured = String::new();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::time::Duration;

    use super::{run_bounded, ExecSpec};

    fn shell(script: &str) -> ExecSpec {
        ExecSpec { program: "/bin/sh".to_string(), args: vec!["-c".to_string(), script.to_string()] }
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let output = run_bounded(&shell("echo hello"), Duration::from_secs(5))
            .await
            .expect("spawn should succeed");

        assert!(output.exit_ok);
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "hello\n");
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn captures_stderr_separately() {
        let output = run_bounded(&shell("echo oops 1>&2; exit 3"), Duration::from_secs(5))
            .await
            .expect("spawn should succeed");

        assert!(!output.exit_ok);
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn kills_a_sleeping_child_at_the_deadline() {
        let started = Instant::now();
        let output = run_bounded(&shell("sleep 30"), Duration::from_millis(300))
            .await
            .expect("spawn should succeed");

        assert!(output.timed_out);
        assert!(!output.exit_ok);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "timeout must bound the wall-clock wait"
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error_not_a_timeout() {
        let spec = ExecSpec {
            program: "/nonexistent/binary/for/parsergen".to_string(),
            args: vec![],
        };
        let result = run_bounded(&spec, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
