//! The generate/test/refine loop.
//!
//! `RetryController` drives one run for one target through the phases
//!
//! ```text
//! START -> ANALYZING -> GENERATING -> TESTING -> SUCCEEDED
//!                            ^            |
//!                            +- RETRY_GEN-+----> FAILED
//! ```
//!
//! The controller is the only stateful party: collaborators are invoked
//! through narrow seams and hold no state across iterations. One candidate
//! is live at a time; the attempt counter strictly increases; the loop
//! terminates at the bound regardless of verdicts.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parsergen_core::{AgentError, Candidate, RunReport, RunStatus, Target, Verdict};
use parsergen_sandbox::SandboxRunner;

use crate::analyzer::{read_expected_header, StructureAnalyzer};
use crate::oracle::{CodeOracle, OracleError, Proposal};
use crate::prompt::{initial_prompt, refinement_prompt, TaskBrief};
use crate::store::ArtifactStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Analyzing,
    Generating,
    Testing,
    RetryGenerating,
    Succeeded,
    Failed,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Testing => "testing",
            Self::RetryGenerating => "retry_generating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

pub struct RetryController {
    analyzer: Arc<dyn StructureAnalyzer>,
    oracle: Arc<dyn CodeOracle>,
    sandbox: Arc<dyn SandboxRunner>,
    store: ArtifactStore,
    max_attempts: u32,
}

impl RetryController {
    pub fn new(
        analyzer: Arc<dyn StructureAnalyzer>,
        oracle: Arc<dyn CodeOracle>,
        sandbox: Arc<dyn SandboxRunner>,
        store: ArtifactStore,
        max_attempts: u32,
    ) -> Self {
        Self { analyzer, oracle, sandbox, store, max_attempts }
    }

    /// Run the loop to a terminal report.
    ///
    /// `Ok` carries the user-visible outcome: SUCCEEDED with the artifact
    /// location, or FAILED with the attempts consumed and the last
    /// diagnostic. `Err` is reserved for infrastructure problems (sandbox
    /// setup, oracle auth/quota, artifact write) that abort the run without
    /// touching the attempt budget.
    pub async fn run(&self, target: &Target) -> Result<RunReport, AgentError> {
        info!(
            event_name = "agent.run.start",
            target = %target.name,
            max_attempts = self.max_attempts,
            "starting parser generation run"
        );

        self.enter(Phase::Analyzing, target);
        let context = match self.analyze(target) {
            Ok(context) => context,
            Err(error) if error.is_pre_generation() => {
                // Nothing to retry against; terminal with zero attempts.
                self.enter(Phase::Failed, target);
                return Ok(RunReport::new(
                    target.name.clone(),
                    RunStatus::Failed { attempts: 0, last_diagnostic: error.to_string() },
                ));
            }
            Err(error) => return Err(error),
        };
        let brief = TaskBrief {
            target,
            summary: &context.summary,
            expected_header: &context.expected_header,
        };

        let mut attempts = 0u32;
        let mut last_failure: Option<(Candidate, Verdict)> = None;

        loop {
            self.enter(
                if last_failure.is_some() { Phase::RetryGenerating } else { Phase::Generating },
                target,
            );
            let prompt = match &last_failure {
                None => initial_prompt(&brief),
                Some((previous, verdict)) => {
                    refinement_prompt(&brief, &previous.source, &verdict.diagnostics)
                }
            };

            let source = match self.oracle.propose(&prompt).await.map_err(map_oracle_error)? {
                Proposal::Candidate(source) => source,
                Proposal::Decline(reason) => {
                    let declined = AgentError::OracleDeclined(reason);
                    warn!(
                        event_name = "agent.oracle.declined",
                        target = %target.name,
                        attempts,
                        reason = %declined,
                        "oracle declined; terminating run"
                    );
                    self.enter(Phase::Failed, target);
                    return Ok(RunReport::new(
                        target.name.clone(),
                        RunStatus::Failed { attempts, last_diagnostic: declined.to_string() },
                    ));
                }
            };

            attempts += 1;
            let candidate = Candidate { attempt: attempts, source };

            self.enter(Phase::Testing, target);
            let verdict = self
                .sandbox
                .run(&candidate, target)
                .await
                .map_err(|err| AgentError::Environment(err.to_string()))?;
            info!(
                event_name = "agent.attempt.verdict",
                target = %target.name,
                attempt = attempts,
                outcome = if verdict.passed() { "pass" } else { "fail" },
                duration_ms = verdict.duration_ms,
                "candidate verdict received"
            );

            if verdict.passed() {
                let artifact = self.store.save(target, &candidate.source)?;
                self.enter(Phase::Succeeded, target);
                return Ok(RunReport::new(
                    target.name.clone(),
                    RunStatus::Succeeded { artifact, attempts },
                ));
            }

            if attempts >= self.max_attempts {
                self.enter(Phase::Failed, target);
                return Ok(RunReport::new(
                    target.name.clone(),
                    RunStatus::Failed { attempts, last_diagnostic: verdict.diagnostics },
                ));
            }

            last_failure = Some((candidate, verdict));
        }
    }

    fn analyze(&self, target: &Target) -> Result<RunContext, AgentError> {
        let summary = self.analyzer.analyze(target)?;
        let expected_header = read_expected_header(&target.expected_csv)?;
        Ok(RunContext { summary, expected_header })
    }

    fn enter(&self, phase: Phase, target: &Target) {
        debug!(
            event_name = "agent.phase",
            target = %target.name,
            phase = phase.as_str(),
            "phase transition"
        );
    }
}

struct RunContext {
    summary: parsergen_core::StructuralSummary,
    expected_header: Vec<String>,
}

fn map_oracle_error(error: OracleError) -> AgentError {
    AgentError::Environment(error.to_string())
}
