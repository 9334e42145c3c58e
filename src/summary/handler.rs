use async_trait::async_trait;
use tracing::info;

use super::workflow::SummaryWorkflow;
use crate::anthropic::MessageSender;
use crate::error::WorkflowError;
use crate::persistence::SummaryStore;
use crate::scheduler::{JobHandler, JobPayload};

/// Binds the summary workflow to the `asset-summary` job type.
pub struct SummaryJobHandler<S, P> {
    workflow: SummaryWorkflow<S, P>,
}

impl<S, P> SummaryJobHandler<S, P> {
    pub fn new(workflow: SummaryWorkflow<S, P>) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl<S, P> JobHandler for SummaryJobHandler<S, P>
where
    S: MessageSender + 'static,
    P: SummaryStore + 'static,
{
    async fn handle(&self, payload: JobPayload) -> anyhow::Result<()> {
        let request = match payload {
            JobPayload::AssetSummary(request) => request,
            JobPayload::Custom { job_type, .. } => {
                return Err(WorkflowError::UnexpectedPayload(job_type).into());
            }
        };

        let report = self.workflow.run(request).await?;
        info!(
            asset_id = %report.asset_id,
            attempts = report.attempts,
            valid = report.is_valid,
            severity = %report.summary.severity,
            "asset summary stored"
        );
        Ok(())
    }
}
