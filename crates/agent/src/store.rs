//! Persistence of accepted candidates.

use std::path::{Path, PathBuf};

use tracing::info;

use parsergen_core::{AgentError, Target};

/// Writes the accepted parser under a name derived from the target.
/// Re-running a target overwrites its previous artifact; idempotent reruns
/// are expected.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    parser_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(parser_dir: impl Into<PathBuf>) -> Self {
        Self { parser_dir: parser_dir.into() }
    }

    pub fn artifact_path(&self, target: &Target) -> PathBuf {
        self.parser_dir.join(target.artifact_file_name())
    }

    pub fn save(&self, target: &Target, source: &str) -> Result<PathBuf, AgentError> {
        std::fs::create_dir_all(&self.parser_dir).map_err(|err| {
            AgentError::Persist(format!(
                "could not create parser dir `{}`: {err}",
                self.parser_dir.display()
            ))
        })?;

        let path = self.artifact_path(target);
        std::fs::write(&path, source).map_err(|err| {
            AgentError::Persist(format!("could not write `{}`: {err}", path.display()))
        })?;

        info!(
            event_name = "agent.artifact.saved",
            target = %target.name,
            path = %path.display(),
            "validated parser persisted"
        );
        Ok(path)
    }

    pub fn parser_dir(&self) -> &Path {
        &self.parser_dir
    }
}
