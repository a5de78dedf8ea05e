//! Progress sink that records every update.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::stage::ProgressSink;

#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    updates: Arc<RwLock<Vec<(u8, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(percent, message)` published so far, in order.
    pub async fn updates(&self) -> Vec<(u8, String)> {
        self.updates.read().await.clone()
    }

    pub async fn percents(&self) -> Vec<u8> {
        self.updates.read().await.iter().map(|(p, _)| *p).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn publish(&self, percent: u8, message: String) {
        self.updates.write().await.push((percent, message));
    }
}
