//! Agent runtime - the generate/test/refine loop that writes bank-statement
//! parsers.
//!
//! This crate is the control-flow heart of parsergen:
//!
//! 1. **Structure analysis** (`analyzer`) - sample the target PDF once for
//!    prompt context
//! 2. **Candidate generation** (`oracle`, `prompt`) - ask the reasoning
//!    oracle for a `parse` function, threading prior failure diagnostics
//!    into refinement prompts
//! 3. **Isolated testing** - submit each candidate to the sandbox seam and
//!    read back a strict pass/fail verdict
//! 4. **Persistence** (`store`) - write the accepted candidate under a name
//!    derived from the target
//!
//! # Key Types
//!
//! - `RetryController` - owns the loop state machine and the attempt budget
//!   (see `controller`)
//! - `CodeOracle` - pluggable trait for the reasoning backend; `GeminiOracle`
//!   is the production implementation
//! - `StructureAnalyzer` - pluggable trait for document inspection
//!
//! # Contract
//!
//! The oracle is non-deterministic by contract: identical prompts may yield
//! different candidates, and the loop never assumes otherwise. Candidate
//! code is never executed in this process; only the sandbox sees it.

pub mod analyzer;
pub mod controller;
pub mod oracle;
pub mod prompt;
pub mod store;

pub use analyzer::{PdfStructureAnalyzer, StructureAnalyzer};
pub use controller::RetryController;
pub use oracle::{ChatCompletionsOracle, CodeOracle, GeminiOracle, Proposal};
pub use store::ArtifactStore;
