use std::path::PathBuf;

use thiserror::Error;

/// Run-level failure taxonomy.
///
/// A candidate that runs and produces wrong data is not an error at all: it
/// is a FAIL `Verdict`, retryable up to the attempt bound. Everything here
/// short-circuits the run without consuming attempt budget.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("sample document not found at `{0}`")]
    DocumentNotFound(PathBuf),
    #[error("document analysis failed: {0}")]
    Analysis(String),
    #[error("execution environment failure: {0}")]
    Environment(String),
    #[error("reasoning oracle declined to continue: {0}")]
    OracleDeclined(String),
    #[error("artifact persistence failed: {0}")]
    Persist(String),
}

impl AgentError {
    /// Infrastructure problems are surfaced to the operator as-is; retrying
    /// them would burn the attempt budget on something no candidate can fix.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Environment(_) | Self::Persist(_))
    }

    /// True for failures that occur before any candidate was generated.
    pub fn is_pre_generation(&self) -> bool {
        matches!(self, Self::DocumentNotFound(_) | Self::Analysis(_))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::AgentError;

    #[test]
    fn analyzer_failures_are_pre_generation_not_infrastructure() {
        let missing = AgentError::DocumentNotFound(PathBuf::from("data/x/x sample.pdf"));
        assert!(missing.is_pre_generation());
        assert!(!missing.is_infrastructure());

        let unreadable = AgentError::Analysis("encrypted document".to_owned());
        assert!(unreadable.is_pre_generation());
        assert!(!unreadable.is_infrastructure());
    }

    #[test]
    fn environment_failures_are_infrastructure() {
        let error = AgentError::Environment("container runtime unavailable".to_owned());
        assert!(error.is_infrastructure());
        assert!(!error.is_pre_generation());
    }

    #[test]
    fn a_decline_is_neither_infrastructure_nor_pre_generation() {
        let declined = AgentError::OracleDeclined("safety refusal".to_owned());
        assert!(!declined.is_infrastructure());
        assert!(!declined.is_pre_generation());
        assert!(declined.to_string().contains("declined to continue: safety refusal"));
    }

    #[test]
    fn display_messages_carry_operator_context() {
        let error = AgentError::DocumentNotFound(PathBuf::from("data/icici/icici sample.pdf"));
        assert!(error.to_string().contains("icici sample.pdf"));
    }
}
