use thiserror::Error;

/// Failures owned by the job scheduler. Everything except `ShuttingDown` is
/// recorded on the job itself and never returned to the submitter.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shutting down, job rejected")]
    ShuttingDown,

    #[error("no handler registered for job type \"{0}\"")]
    NoHandler(String),

    #[error("job timed out after {0}s")]
    Timeout(u64),

    #[error("job handler panicked: {0}")]
    Panicked(String),
}

/// Failures of one summary workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No usable draft after every attempt was spent.
    #[error("summary generation failed after {attempts} attempts: {last_feedback}")]
    Exhausted { attempts: u32, last_feedback: String },

    #[error("failed to persist summary: {0}")]
    Persist(#[from] StoreError),

    #[error("summary handler cannot process a \"{0}\" payload")]
    UnexpectedPayload(String),
}

/// Failures of the summary persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_handler_message_names_the_type() {
        let err = SchedulerError::NoHandler("foo".into());
        assert_eq!(err.to_string(), "no handler registered for job type \"foo\"");
    }

    #[test]
    fn exhausted_message_carries_feedback() {
        let err = WorkflowError::Exhausted {
            attempts: 2,
            last_feedback: "no JSON object found in response".into(),
        };
        assert_eq!(
            err.to_string(),
            "summary generation failed after 2 attempts: no JSON object found in response"
        );
    }

    #[test]
    fn store_error_wraps_io() {
        let err: WorkflowError =
            StoreError::from(std::io::Error::other("disk full")).into();
        assert_eq!(err.to_string(), "failed to persist summary: IO error: disk full");
    }
}
