use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{HubSnapshot, SnapshotStore};

/// Keeps the last saved snapshot in process memory. Used when persistence is
/// switched off and by tests that need to observe what the hub wrote.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<HubSnapshot>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub async fn write_count(&self) -> u64 {
        *self.writes.lock().await
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<HubSnapshot>> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, snapshot: &HubSnapshot) -> Result<()> {
        *self.saved.lock().await = Some(snapshot.clone());
        *self.writes.lock().await += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
