//! Asset summary generation: prompts, parsing, checks and the
//! generate/validate/retry workflow that ties them together.

pub mod extract;
mod handler;
pub mod prompt;
pub mod schema;
mod types;
pub mod validate;
mod workflow;

pub use handler::SummaryJobHandler;
pub use types::{AssetType, DataCoverage, Severity, Summary, SummaryRequest};
pub use workflow::{Step, SummaryWorkflow, WorkflowConfig, WorkflowReport, WorkflowState};
