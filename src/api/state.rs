use crate::config::{ConfigStore, MonitorConfig};
use crate::detect::engine::DetectionEngine;
use crate::detect::events::EventLog;
use crate::storage::{Pool, SampleStore};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Mutex<ConfigStore>>,
}

impl AppState {
    pub fn new(pool: Pool, config: Arc<Mutex<ConfigStore>>) -> Self {
        Self { pool, config }
    }

    /// Copy of the current configuration, taken under the lock.
    pub async fn config_snapshot(&self) -> MonitorConfig {
        self.config.lock().await.config().clone()
    }

    pub fn samples(&self) -> SampleStore {
        SampleStore::new(self.pool.clone())
    }

    pub fn events(&self) -> EventLog {
        EventLog::new(self.pool.clone())
    }

    pub fn engine(&self) -> DetectionEngine {
        DetectionEngine::new(self.pool.clone())
    }
}
