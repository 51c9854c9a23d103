//! End-to-end comparison semantics of the embedded harness, run against a
//! local `python3` with pandas. Skipped (with a note) when that interpreter
//! is not available on the host.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use tokio::time::Duration;

use parsergen_core::VerdictOutcome;
use parsergen_sandbox::bounded::{run_bounded, ExecOutput, ExecSpec};
use parsergen_sandbox::{verdict_from, HARNESS_SOURCE, SUCCESS_MARKER};

const STUB_PARSER: &str = r#"import pandas as pd


def parse(pdf_path):
    return pd.DataFrame(
        {
            "Date": ["01-08-2024", "02-08-2024"],
            "Description": ["ATM WITHDRAWAL", "UPI TRANSFER"],
            "Amount": [500.0, 1200.5],
        }
    )
"#;

const MATCHING_CSV: &str = "Date,Description,Amount\n\
                            01-08-2024,ATM WITHDRAWAL,500.0\n\
                            02-08-2024,UPI TRANSFER,1200.5\n";

/// Same dataset with one mutated cell (second Amount).
const MUTATED_CSV: &str = "Date,Description,Amount\n\
                           01-08-2024,ATM WITHDRAWAL,500.0\n\
                           02-08-2024,UPI TRANSFER,999.99\n";

fn python_with_pandas() -> bool {
    Command::new("python3")
        .args(["-c", "import pandas"])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn stage(dir: &Path, expected_csv: &str) {
    fs::write(dir.join("test_runner.py"), HARNESS_SOURCE).expect("write harness");
    fs::write(dir.join("parser_to_test.py"), STUB_PARSER).expect("write candidate");

    let data = dir.join("data").join("unit");
    fs::create_dir_all(&data).expect("data dir");
    fs::write(data.join("unit sample.pdf"), b"%PDF-1.4 stub").expect("write sample");
    fs::write(data.join("unit_sample.csv"), expected_csv).expect("write expected csv");
}

async fn run_harness(dir: &Path) -> ExecOutput {
    let spec = ExecSpec {
        program: "python3".to_string(),
        args: vec![dir.join("test_runner.py").display().to_string(), "unit".to_string()],
    };
    run_bounded(&spec, Duration::from_secs(60)).await.expect("python3 should spawn")
}

#[tokio::test]
async fn matching_dataframe_is_a_pass() {
    if !python_with_pandas() {
        eprintln!("skipping: python3 with pandas is not available");
        return;
    }

    let dir = TempDir::new().expect("tempdir");
    stage(dir.path(), MATCHING_CSV);

    let output = run_harness(dir.path()).await;
    let verdict = verdict_from(&output)
        .unwrap_or_else(|err| panic!("harness should run: {err}\nstderr: {}", output.stderr));

    assert_eq!(
        verdict.outcome,
        VerdictOutcome::Pass,
        "stdout: {}\nstderr: {}",
        output.stdout,
        output.stderr
    );
    assert!(output.stdout.contains(SUCCESS_MARKER));
}

#[tokio::test]
async fn one_mutated_expected_cell_fails_with_a_mismatch_diagnostic() {
    if !python_with_pandas() {
        eprintln!("skipping: python3 with pandas is not available");
        return;
    }

    let dir = TempDir::new().expect("tempdir");
    stage(dir.path(), MUTATED_CSV);

    let output = run_harness(dir.path()).await;
    let verdict = verdict_from(&output)
        .unwrap_or_else(|err| panic!("harness should run: {err}\nstderr: {}", output.stderr));

    assert_eq!(verdict.outcome, VerdictOutcome::Fail);
    assert!(
        verdict.diagnostics.contains("dataframe mismatch"),
        "diagnostic should identify the mismatch, got: {}",
        verdict.diagnostics
    );
    assert!(!output.stdout.contains(SUCCESS_MARKER));
}
