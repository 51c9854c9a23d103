use std::process::Command;

use parsergen_core::config::{AppConfig, LoadOptions, OracleProvider};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_oracle_credential(&config));
            checks.push(check_container_runtime(&config));
            checks.push(check_data_dir(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["oracle_credential", "container_runtime", "data_dir_layout"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_oracle_credential(config: &AppConfig) -> DoctorCheck {
    let details = match config.oracle.provider {
        OracleProvider::Gemini | OracleProvider::OpenAi => {
            "api key format validated by config contract".to_string()
        }
        OracleProvider::Ollama => {
            format!(
                "local provider at `{}`",
                config.oracle.base_url.as_deref().unwrap_or_default()
            )
        }
    };
    DoctorCheck { name: "oracle_credential", status: CheckStatus::Pass, details }
}

fn check_container_runtime(config: &AppConfig) -> DoctorCheck {
    match Command::new(&config.sandbox.runtime).arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            DoctorCheck { name: "container_runtime", status: CheckStatus::Pass, details: version }
        }
        Ok(output) => DoctorCheck {
            name: "container_runtime",
            status: CheckStatus::Fail,
            details: format!(
                "`{} --version` exited with {}",
                config.sandbox.runtime, output.status
            ),
        },
        Err(error) => DoctorCheck {
            name: "container_runtime",
            status: CheckStatus::Fail,
            details: format!("could not invoke `{}`: {error}", config.sandbox.runtime),
        },
    }
}

fn check_data_dir(config: &AppConfig) -> DoctorCheck {
    if config.agent.data_dir.is_dir() {
        DoctorCheck {
            name: "data_dir_layout",
            status: CheckStatus::Pass,
            details: format!("data directory present at `{}`", config.agent.data_dir.display()),
        }
    } else {
        DoctorCheck {
            name: "data_dir_layout",
            status: CheckStatus::Fail,
            details: format!(
                "data directory `{}` does not exist",
                config.agent.data_dir.display()
            ),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
