//! Background snapshot writer.
//!
//! Mutations only bump a generation counter. The persister waits for a bump,
//! lets further changes pile up for the configured debounce, then takes one
//! snapshot and writes it outside the hub lock. Each write is still a full
//! rewrite of every retained message.

use std::sync::Arc;

use shared::error::HubError;
use storage::{HubSnapshot, SnapshotStore};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error, warn};

use crate::{config::HubConfig, engine::Hub};

pub fn spawn_persister(hub: Arc<Hub>, store: Arc<dyn SnapshotStore>) -> JoinHandle<()> {
    let mut changes = hub.subscribe_changes();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let debounce = hub.config().persist_debounce;
            if !debounce.is_zero() {
                sleep(debounce).await;
            }
            let generation = *changes.borrow_and_update();

            let snapshot = hub.snapshot().await;
            if let Err(error) = write_snapshot(store.as_ref(), &snapshot, hub.config()).await {
                error!(%error, generation, "giving up on snapshot; in-memory state remains authoritative");
            }
        }
        debug!("persister stopped");
    })
}

/// Saves `snapshot`, retrying with doubling delays up to the configured
/// number of attempts.
pub async fn write_snapshot(
    store: &dyn SnapshotStore,
    snapshot: &HubSnapshot,
    config: &HubConfig,
) -> Result<(), HubError> {
    let attempts = config.persist_max_attempts.max(1);
    let mut delay = config.persist_retry_delay;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match store.save(snapshot).await {
            Ok(()) => {
                debug!(
                    store = %store.describe(),
                    messages = snapshot.message_count(),
                    "snapshot written"
                );
                return Ok(());
            }
            Err(error) => {
                last_error = format!("{error:#}");
                warn!(
                    store = %store.describe(),
                    attempt,
                    attempts,
                    error = %last_error,
                    "snapshot write failed"
                );
                if attempt < attempts {
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    Err(HubError::PersistenceWriteFailure(last_error))
}

#[cfg(test)]
#[path = "tests/persist_tests.rs"]
mod tests;
