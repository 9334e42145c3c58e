use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use super::job::JobPayload;

/// Work bound to one job type.
///
/// An `Err` marks the job failed with the error's message; it never reaches
/// the submitter and never stops the scheduler.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: JobPayload) -> anyhow::Result<()>;
}

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobPayload) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: JobPayload) -> anyhow::Result<()> {
        (self.0)(payload).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Job type → handler bindings.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `job_type`, replacing any earlier binding.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.insert(job_type.clone(), handler).is_some() {
            debug!(job_type = %job_type, "replaced job handler");
        } else {
            debug!(job_type = %job_type, "registered job handler");
        }
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.get(job_type).is_some()
    }

    /// Registered type tags, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut types: Vec<String> = handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
