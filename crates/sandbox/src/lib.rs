//! Isolated execution of untrusted candidate parsers.
//!
//! The orchestration loop only ever sees the [`SandboxRunner`] capability:
//! submit one candidate plus a target, receive a bounded-time [`Verdict`].
//! The concrete isolation mechanism lives behind that seam so a container
//! runtime can be swapped for anything else without touching the loop.
//!
//! [`ContainerSandbox`] is the production implementation. Per run it
//! materializes the candidate and the fixed comparison harness into a
//! unique scratch directory, mounts scratch and target data read-only into
//! a container, and keys PASS/FAIL off the harness success marker rather
//! than the exit code alone.

pub mod bounded;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use parsergen_core::config::SandboxConfig;
use parsergen_core::{Candidate, Target, Verdict, VerdictOutcome};

use crate::bounded::{run_bounded, ExecOutput, ExecSpec};

/// Prefix of every result token the harness prints. Output carrying no
/// such token means the harness itself never ran.
pub const HARNESS_TOKEN: &str = "HARNESS_RESULT::";

/// Literal token the harness prints on its success path and nowhere else.
pub const SUCCESS_MARKER: &str = "HARNESS_RESULT::PASS";

/// Diagnostic text reported when the container exceeds its wall-clock budget.
pub const TIMEOUT_MESSAGE: &str = "execution exceeded time limit";

/// Fixed in-container comparison script, shipped with the binary.
pub const HARNESS_SOURCE: &str = include_str!("../assets/harness.py");

const CANDIDATE_FILE: &str = "parser_to_test.py";
const HARNESS_FILE: &str = "test_runner.py";

/// Infrastructure failure while setting up or launching the sandbox.
///
/// Distinct from a candidate FAIL on purpose: retrying a broken environment
/// as if it were a code defect would waste the attempt budget.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox environment failure: {0}")]
    Environment(String),
}

#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, candidate: &Candidate, target: &Target) -> Result<Verdict, SandboxError>;
}

pub struct ContainerSandbox {
    config: SandboxConfig,
}

impl ContainerSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Write the candidate and harness into a scratch directory keyed by
    /// `run_id`. The id is unique per invocation so concurrent runs never
    /// share same-named files.
    async fn materialize(&self, candidate: &Candidate, run_id: &str) -> Result<PathBuf, SandboxError> {
        let scratch = self.config.workspace_root.join(run_id);

        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|err| SandboxError::Environment(format!("could not create scratch dir: {err}")))?;
        tokio::fs::write(scratch.join(CANDIDATE_FILE), &candidate.source)
            .await
            .map_err(|err| SandboxError::Environment(format!("could not write candidate: {err}")))?;
        tokio::fs::write(scratch.join(HARNESS_FILE), HARNESS_SOURCE)
            .await
            .map_err(|err| SandboxError::Environment(format!("could not write harness: {err}")))?;

        Ok(scratch)
    }

    fn exec_spec(
        &self,
        scratch: &Path,
        target: &Target,
        run_id: &str,
    ) -> Result<ExecSpec, SandboxError> {
        let scratch = absolute(scratch)?;
        let data_dir = absolute(target.data_dir())?;

        // The container is named after the run so a timed-out container can
        // be killed by name after the attached client is gone.
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            run_id.to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];
        for (host, guest) in [
            (scratch.join(CANDIDATE_FILE), format!("/app/{CANDIDATE_FILE}")),
            (scratch.join(HARNESS_FILE), format!("/app/{HARNESS_FILE}")),
            (data_dir.clone(), format!("/app/data/{}", target.name)),
        ] {
            args.push("-v".to_string());
            args.push(format!("{}:{guest}:ro", host.display()));
        }
        args.push(self.config.image.clone());
        args.push("python".to_string());
        args.push(format!("/app/{HARNESS_FILE}"));
        args.push(target.name.to_string());

        Ok(ExecSpec { program: self.config.runtime.clone(), args })
    }

    /// Force-terminate a timed-out container. Best effort; a container that
    /// already exited makes `kill` fail, which is fine.
    async fn reap(&self, container: &str) {
        let outcome = tokio::process::Command::new(&self.config.runtime)
            .args(["kill", container])
            .output()
            .await;

        match outcome {
            Ok(output) if output.status.success() => {
                debug!(
                    event_name = "sandbox.container.reaped",
                    container,
                    "timed-out container terminated"
                );
            }
            Ok(output) => {
                warn!(
                    event_name = "sandbox.container.reap_failed",
                    container,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "could not terminate timed-out container"
                );
            }
            Err(err) => {
                warn!(
                    event_name = "sandbox.container.reap_failed",
                    container,
                    error = %err,
                    "could not invoke container runtime for teardown"
                );
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, SandboxError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|err| SandboxError::Environment(format!("could not resolve working dir: {err}")))
}

/// Map raw harness output to a verdict. PASS requires both a clean exit and
/// the literal success marker on stdout; exit code alone cannot distinguish
/// "ran fine but data mismatched" from "crashed".
///
/// The harness prints a `HARNESS_RESULT::` token on every path it controls.
/// Output with no token at all means the container never reached the
/// harness (daemon down, image missing; the docker client exits 125-127
/// with the error on stderr). That is an environment failure, not a
/// candidate verdict, and must not consume an attempt.
pub fn verdict_from(output: &ExecOutput) -> Result<Verdict, SandboxError> {
    if output.timed_out {
        return Ok(Verdict {
            outcome: VerdictOutcome::Fail,
            diagnostics: TIMEOUT_MESSAGE.to_string(),
            duration_ms: output.duration_ms,
        });
    }

    if !output.stdout.contains(HARNESS_TOKEN) {
        return Err(SandboxError::Environment(format!(
            "container did not start (exit code {}): {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }

    let passed = output.exit_ok && output.stdout.contains(SUCCESS_MARKER);
    let diagnostics = if passed {
        output.stdout.clone()
    } else {
        format!("Test Failed! Output:\n{}\nStderr:\n{}", output.stdout, output.stderr)
    };

    Ok(Verdict {
        outcome: if passed { VerdictOutcome::Pass } else { VerdictOutcome::Fail },
        diagnostics,
        duration_ms: output.duration_ms,
    })
}

#[async_trait]
impl SandboxRunner for ContainerSandbox {
    async fn run(&self, candidate: &Candidate, target: &Target) -> Result<Verdict, SandboxError> {
        let run_id = format!("run-{}", Uuid::new_v4());
        let scratch = self.materialize(candidate, &run_id).await?;
        let spec = self.exec_spec(&scratch, target, &run_id)?;
        debug!(
            event_name = "sandbox.container.launch",
            target = %target.name,
            attempt = candidate.attempt,
            runtime = %self.config.runtime,
            image = %self.config.image,
            "launching isolated test run"
        );

        let result = run_bounded(&spec, Duration::from_secs(self.config.timeout_secs)).await;

        // Killing the attached client does not stop the container itself;
        // reap it by name before the mounts underneath it go away.
        if matches!(&result, Ok(output) if output.timed_out) {
            self.reap(&run_id).await;
        }

        if let Err(err) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(
                event_name = "sandbox.scratch.cleanup_failed",
                scratch = %scratch.display(),
                error = %err,
                "scratch directory was left behind"
            );
        }

        let output = result.map_err(|err| {
            SandboxError::Environment(format!(
                "could not launch container runtime `{}`: {err}",
                self.config.runtime
            ))
        })?;

        verdict_from(&output)
    }
}
