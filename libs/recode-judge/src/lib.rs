//! Client for a remote code-execution backend.
//!
//! `JudgeClient` is the entry point: it resolves runtimes, submits code,
//! polls to completion (singly or in batches) and grades the output.

pub mod batch;
pub mod cache;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod grader;
pub mod language;
pub mod literal;
pub mod normalize;
pub mod poller;
pub mod protocol;
pub mod transport;
pub mod wire;

mod executor_tests;
#[cfg(test)]
mod testing;

pub use batch::{BatchOrchestrator, BatchOutcome, BatchSettings};
pub use catalog::{CatalogService, StatusTable};
pub use error::{JudgeError, JudgeResult};
pub use executor::JudgeClient;
pub use grader::{Equivalence, GradeOutcome, ResultGrader};
pub use language::LanguageResolver;
pub use poller::{PollSettings, PollingOrchestrator};
pub use protocol::{ExecutionBackend, Judge0Protocol};
