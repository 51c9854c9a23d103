//! Loop-level behavior of `RetryController` against stub collaborators.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use parsergen_agent::analyzer::StructureAnalyzer;
use parsergen_agent::oracle::{CodeOracle, OracleError, Proposal};
use parsergen_agent::store::ArtifactStore;
use parsergen_agent::RetryController;
use parsergen_core::{
    AgentError, Candidate, RunStatus, StructuralSummary, Target, Verdict, VerdictOutcome,
};
use parsergen_sandbox::{SandboxError, SandboxRunner};

struct StubAnalyzer;

impl StructureAnalyzer for StubAnalyzer {
    fn analyze(&self, _target: &Target) -> Result<StructuralSummary, AgentError> {
        Ok(StructuralSummary {
            text_sample: "Date Description Amount".to_string(),
            table_info: vec!["Page 1 tables: 1".to_string()],
            total_pages: 2,
        })
    }
}

struct FailingAnalyzer(AgentError);

impl StructureAnalyzer for FailingAnalyzer {
    fn analyze(&self, _target: &Target) -> Result<StructuralSummary, AgentError> {
        Err(self.0.clone())
    }
}

#[derive(Default)]
struct StubOracle {
    replies: Mutex<VecDeque<Proposal>>,
    prompts: Mutex<Vec<String>>,
}

impl StubOracle {
    fn with_replies(replies: impl IntoIterator<Item = Proposal>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()), prompts: Mutex::new(Vec::new()) }
    }

    fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl CodeOracle for StubOracle {
    async fn propose(&self, prompt: &str) -> Result<Proposal, OracleError> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_string());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| OracleError::Transport("stub exhausted".to_string()))
    }
}

#[derive(Default)]
struct StubSandbox {
    verdicts: Mutex<VecDeque<Verdict>>,
    tested_sources: Mutex<Vec<String>>,
}

impl StubSandbox {
    fn with_verdicts(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            tested_sources: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SandboxRunner for StubSandbox {
    async fn run(&self, candidate: &Candidate, _target: &Target) -> Result<Verdict, SandboxError> {
        self.tested_sources.lock().expect("sources lock").push(candidate.source.clone());
        self.verdicts
            .lock()
            .expect("verdicts lock")
            .pop_front()
            .ok_or_else(|| SandboxError::Environment("stub exhausted".to_string()))
    }
}

struct BrokenSandbox;

#[async_trait]
impl SandboxRunner for BrokenSandbox {
    async fn run(&self, _candidate: &Candidate, _target: &Target) -> Result<Verdict, SandboxError> {
        Err(SandboxError::Environment("container runtime unavailable".to_string()))
    }
}

fn pass() -> Verdict {
    Verdict {
        outcome: VerdictOutcome::Pass,
        diagnostics: "HARNESS_RESULT::PASS".to_string(),
        duration_ms: 5,
    }
}

fn fail(diagnostics: &str) -> Verdict {
    Verdict { outcome: VerdictOutcome::Fail, diagnostics: diagnostics.to_string(), duration_ms: 5 }
}

fn candidate_reply(tag: &str) -> Proposal {
    Proposal::Candidate(format!("def parse(pdf_path):\n    return '{tag}'\n"))
}

/// Fixture: a target rooted in a temp dir with its ground-truth CSV present.
fn target_fixture(dir: &TempDir, name: &str) -> Target {
    let target = Target::from_data_dir(name, dir.path());
    fs::create_dir_all(target.data_dir()).expect("data dir");
    fs::write(&target.expected_csv, "Date,Description,Amount\n").expect("expected csv");
    target
}

fn controller(
    oracle: Arc<StubOracle>,
    sandbox: Arc<dyn SandboxRunner>,
    parser_dir: &Path,
    max_attempts: u32,
) -> RetryController {
    RetryController::new(
        Arc::new(StubAnalyzer),
        oracle,
        sandbox,
        ArtifactStore::new(parser_dir),
        max_attempts,
    )
}

#[tokio::test]
async fn first_attempt_pass_terminates_succeeded_with_one_attempt() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "icici");

    let oracle = Arc::new(StubOracle::with_replies([candidate_reply("v1")]));
    let sandbox = Arc::new(StubSandbox::with_verdicts([pass()]));
    let report = controller(oracle.clone(), sandbox, &parser_dir, 3)
        .run(&target)
        .await
        .expect("run should complete");

    let RunStatus::Succeeded { artifact, attempts } = report.status else {
        panic!("expected success, got {:?}", report.status);
    };
    assert_eq!(attempts, 1);
    assert!(artifact.exists(), "artifact must exist after a successful run");
    let written = fs::read_to_string(&artifact).expect("read artifact");
    assert!(written.contains("'v1'"));
}

#[tokio::test]
async fn persistent_failure_exhausts_the_attempt_bound() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "sbi");

    let oracle = Arc::new(StubOracle::with_replies([
        candidate_reply("v1"),
        candidate_reply("v2"),
        candidate_reply("v3"),
    ]));
    let sandbox =
        Arc::new(StubSandbox::with_verdicts([fail("fail-1"), fail("fail-2"), fail("fail-3")]));
    let report = controller(oracle.clone(), sandbox, &parser_dir, 3)
        .run(&target)
        .await
        .expect("run should complete");

    let RunStatus::Failed { attempts, last_diagnostic } = report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert_eq!(attempts, 3);
    assert_eq!(last_diagnostic, "fail-3", "final diagnostic must be the third verdict's text");
    assert!(!parser_dir.exists(), "no artifact may exist after a failed run");

    // Each retry prompt carries the preceding failure and candidate.
    let prompts = oracle.seen_prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("fail-"));
    assert!(prompts[1].contains("fail-1") && prompts[1].contains("'v1'"));
    assert!(prompts[2].contains("fail-2") && prompts[2].contains("'v2'"));
}

#[tokio::test]
async fn fail_then_pass_persists_the_second_candidate() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "hdfc");

    let oracle =
        Arc::new(StubOracle::with_replies([candidate_reply("v1"), candidate_reply("v2")]));
    let sandbox = Arc::new(StubSandbox::with_verdicts([fail("wrong columns"), pass()]));
    let report = controller(oracle, sandbox, &parser_dir, 3)
        .run(&target)
        .await
        .expect("run should complete");

    let RunStatus::Succeeded { artifact, attempts } = report.status else {
        panic!("expected success, got {:?}", report.status);
    };
    assert_eq!(attempts, 2);
    let written = fs::read_to_string(artifact).expect("read artifact");
    assert!(written.contains("'v2'") && !written.contains("'v1'"));
}

#[tokio::test]
async fn analyzer_failure_terminates_failed_with_zero_attempts() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "axis");

    let oracle = Arc::new(StubOracle::default());
    let controller = RetryController::new(
        Arc::new(FailingAnalyzer(AgentError::DocumentNotFound(target.sample_pdf.clone()))),
        oracle.clone(),
        Arc::new(StubSandbox::default()),
        ArtifactStore::new(&parser_dir),
        3,
    );

    let report = controller.run(&target).await.expect("run should complete");

    let RunStatus::Failed { attempts, last_diagnostic } = report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert_eq!(attempts, 0, "analyzer failures must not consume attempts");
    assert!(last_diagnostic.contains("not found"));
    assert!(oracle.seen_prompts().is_empty(), "oracle must not be called without a summary");
}

#[tokio::test]
async fn missing_ground_truth_is_a_zero_attempt_failure() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    // No CSV written for this target.
    let target = Target::from_data_dir("kotak", dir.path());

    let oracle = Arc::new(StubOracle::default());
    let report = controller(oracle.clone(), Arc::new(StubSandbox::default()), &parser_dir, 3)
        .run(&target)
        .await
        .expect("run should complete");

    let RunStatus::Failed { attempts, .. } = report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert_eq!(attempts, 0);
    assert!(oracle.seen_prompts().is_empty());
}

#[tokio::test]
async fn sandbox_environment_error_aborts_without_a_report() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "icici");

    let oracle = Arc::new(StubOracle::with_replies([candidate_reply("v1")]));
    let error = controller(oracle, Arc::new(BrokenSandbox), &parser_dir, 3)
        .run(&target)
        .await
        .expect_err("environment failure must abort the run");

    assert!(matches!(error, AgentError::Environment(_)));
    assert!(error.to_string().contains("container runtime unavailable"));
    assert!(!parser_dir.exists(), "no artifact may exist after an aborted run");
}

#[tokio::test]
async fn oracle_decline_terminates_failed_without_consuming_an_attempt() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "icici");

    let oracle = Arc::new(StubOracle::with_replies([Proposal::Decline(
        "cannot produce a parser for this input".to_string(),
    )]));
    let report = controller(oracle, Arc::new(StubSandbox::default()), &parser_dir, 3)
        .run(&target)
        .await
        .expect("run should complete");

    let RunStatus::Failed { attempts, last_diagnostic } = report.status else {
        panic!("expected failure, got {:?}", report.status);
    };
    assert_eq!(attempts, 0, "a decline is not a candidate and consumes no attempt");
    assert!(last_diagnostic.contains("oracle declined"));
    assert!(last_diagnostic.contains("cannot produce a parser"));
}

#[tokio::test]
async fn attempt_bound_is_respected_for_non_default_budgets() {
    let dir = TempDir::new().expect("tempdir");
    let parser_dir = dir.path().join("custom_parsers");
    let target = target_fixture(&dir, "icici");

    let oracle = Arc::new(StubOracle::with_replies([candidate_reply("v1")]));
    let sandbox = Arc::new(StubSandbox::with_verdicts([fail("fail-1")]));
    let report = controller(oracle.clone(), sandbox, &parser_dir, 1)
        .run(&target)
        .await
        .expect("run should complete");

    assert!(!report.succeeded());
    assert_eq!(report.attempts(), 1);
    assert_eq!(oracle.seen_prompts().len(), 1);
}
