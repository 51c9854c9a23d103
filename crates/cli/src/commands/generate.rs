use std::path::PathBuf;
use std::sync::Arc;

use parsergen_agent::oracle::CodeOracle;
use parsergen_agent::{
    ArtifactStore, ChatCompletionsOracle, GeminiOracle, PdfStructureAnalyzer, RetryController,
};
use parsergen_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, OracleProvider};
use parsergen_core::{AgentError, RunReport, RunStatus, Target};
use parsergen_sandbox::ContainerSandbox;

use crate::commands::CommandResult;

#[derive(Debug, Default)]
pub struct Options {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub parser_dir: Option<PathBuf>,
    pub max_attempts: Option<u32>,
}

enum RunEnd {
    Report(RunReport),
    Infrastructure(AgentError),
    Cancelled,
}

pub fn run(target_name: &str, options: Options) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        require_file: options.config_path.is_some(),
        config_path: options.config_path,
        overrides: ConfigOverrides {
            data_dir: options.data_dir,
            parser_dir: options.parser_dir,
            max_attempts: options.max_attempts,
            ..ConfigOverrides::default()
        },
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "config_validation",
                error.to_string(),
                2,
                None,
            )
        }
    };

    init_logging(&config);

    let oracle: Arc<dyn CodeOracle> = match build_oracle(&config) {
        Ok(oracle) => oracle,
        Err(message) => {
            return CommandResult::failure("generate", "environment", message, 3, None)
        }
    };

    let target = Target::from_data_dir(target_name, &config.agent.data_dir);
    let controller = RetryController::new(
        Arc::new(PdfStructureAnalyzer),
        oracle,
        Arc::new(ContainerSandbox::new(config.sandbox.clone())),
        ArtifactStore::new(config.agent.parser_dir.clone()),
        config.agent.max_attempts,
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "environment",
                format!("failed to initialize async runtime: {error}"),
                3,
                None,
            )
        }
    };

    let end = runtime.block_on(async {
        tokio::select! {
            // Dropping the run future kills any in-flight sandbox child;
            // a cancelled run never reports a verdict.
            _ = tokio::signal::ctrl_c() => RunEnd::Cancelled,
            result = controller.run(&target) => match result {
                Ok(report) => RunEnd::Report(report),
                Err(error) => RunEnd::Infrastructure(error),
            },
        }
    });

    match end {
        RunEnd::Report(report) => {
            let summary = match &report.status {
                RunStatus::Succeeded { artifact, attempts } => format!(
                    "parser for `{target_name}` accepted after {attempts} attempt(s); saved to `{}`",
                    artifact.display()
                ),
                RunStatus::Failed { attempts, .. } => {
                    format!("no passing parser for `{target_name}` after {attempts} attempt(s)")
                }
            };
            if report.succeeded() {
                CommandResult::success("generate", summary, Some(report))
            } else {
                CommandResult::failure("generate", "run_failed", summary, 1, Some(report))
            }
        }
        RunEnd::Infrastructure(error) => {
            CommandResult::failure("generate", "environment", error.to_string(), 3, None)
        }
        RunEnd::Cancelled => {
            CommandResult::failure("generate", "cancelled", "run cancelled by operator", 130, None)
        }
    }
}

fn build_oracle(config: &AppConfig) -> Result<Arc<dyn CodeOracle>, String> {
    match config.oracle.provider {
        OracleProvider::Gemini => GeminiOracle::new(config.oracle.clone())
            .map(|oracle| Arc::new(oracle) as Arc<dyn CodeOracle>)
            .map_err(|error| error.to_string()),
        OracleProvider::OpenAi | OracleProvider::Ollama => {
            ChatCompletionsOracle::new(config.oracle.clone())
                .map(|oracle| Arc::new(oracle) as Arc<dyn CodeOracle>)
                .map_err(|error| error.to_string())
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // try_init: repeated invocations inside one process (tests) keep the
    // first subscriber.
    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}
