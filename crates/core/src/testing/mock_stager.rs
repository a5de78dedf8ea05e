//! Mock object stager.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::stage::{ErrorKind, StageError, StageOutcome};
use crate::storage::ObjectStager;

/// In-memory [`ObjectStager`] that tracks which objects still exist.
#[derive(Debug, Default)]
pub struct MockStager {
    uploaded: Arc<RwLock<Vec<String>>>,
    live: Arc<RwLock<Vec<String>>>,
    fail_deletes: Arc<RwLock<bool>>,
}

impl MockStager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every URI ever handed out.
    pub async fn uploaded(&self) -> Vec<String> {
        self.uploaded.read().await.clone()
    }

    /// URIs uploaded and not yet deleted.
    pub async fn live_objects(&self) -> Vec<String> {
        self.live.read().await.clone()
    }

    pub async fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write().await = fail;
    }
}

#[async_trait]
impl ObjectStager for MockStager {
    async fn upload(&self, path: &Path) -> StageOutcome<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        let mut uploaded = self.uploaded.write().await;
        let uri = format!("mock://staging/{}-{}", uploaded.len() + 1, name);
        uploaded.push(uri.clone());
        self.live.write().await.push(uri.clone());
        Ok(uri)
    }

    async fn delete(&self, uri: &str) -> StageOutcome<()> {
        if *self.fail_deletes.read().await {
            return Err(StageError::new(
                ErrorKind::ConnectionError,
                format!("mock delete failure for {}", uri),
            ));
        }
        self.live.write().await.retain(|u| u != uri);
        Ok(())
    }
}
