pub mod config;
pub mod domain;
pub mod errors;

pub use domain::run::{
    Candidate, RunReport, RunStatus, StructuralSummary, Verdict, VerdictOutcome,
};
pub use domain::target::{Target, TargetName};
pub use errors::AgentError;
