//! Where finished summaries go.
//!
//! The workflow only needs create-or-replace semantics keyed by asset id, so
//! the seam is a single `upsert` call.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::StoreError;
use crate::summary::{AssetType, Summary};

pub trait SummaryStore: Send + Sync {
    /// Create or replace the summary for `summary.id`.
    fn upsert(
        &self,
        asset_type: AssetType,
        summary: &Summary,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<T: SummaryStore> SummaryStore for Arc<T> {
    fn upsert(
        &self,
        asset_type: AssetType,
        summary: &Summary,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).upsert(asset_type, summary)
    }
}

/// Keeps summaries in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    summaries: Mutex<HashMap<(AssetType, String), Summary>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, asset_type: AssetType, asset_id: &str) -> Option<Summary> {
        let summaries = self.summaries.lock().unwrap_or_else(|e| e.into_inner());
        summaries.get(&(asset_type, asset_id.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.summaries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SummaryStore for InMemorySummaryStore {
    async fn upsert(&self, asset_type: AssetType, summary: &Summary) -> Result<(), StoreError> {
        let mut summaries = self.summaries.lock().unwrap_or_else(|e| e.into_inner());
        summaries.insert((asset_type, summary.id.clone()), summary.clone());
        Ok(())
    }
}

/// Writes one pretty-printed JSON file per asset under
/// `<root>/<asset_type>/<asset_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSummaryStore {
    root: PathBuf,
}

impl JsonFileSummaryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, asset_type: AssetType, asset_id: &str) -> PathBuf {
        self.root
            .join(asset_type.as_str())
            .join(format!("{}.json", file_stem(asset_id)))
    }
}

impl SummaryStore for JsonFileSummaryStore {
    async fn upsert(&self, asset_type: AssetType, summary: &Summary) -> Result<(), StoreError> {
        let path = self.path_for(asset_type, &summary.id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(summary)?;

        // Write then rename so readers never see a half-written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "summary written");
        Ok(())
    }
}

/// Asset ids are hostnames or IPs; keep them readable but filesystem-safe.
fn file_stem(asset_id: &str) -> String {
    let stem: String = asset_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        format!("_{stem}")
    } else {
        stem
    }
}
