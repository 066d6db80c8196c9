//! Selective persistence of the last-connected hints.
//!
//! Only [`DurableState`] ever reaches storage. It is projected out of each
//! snapshot with [`partialize`] and overlaid on the initial snapshot with
//! [`merge`]; both are pure. The [`Persister`] owns the background task that
//! performs the actual writes so that transitions never wait on storage.
//!
//! Stored layout under the configured key:
//!
//! `{ "state": { "lastConnectedWalletName": "Foo", "lastConnectedAccountAddress": "0xA" }, "version": 0 }`

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::errors::StorageError;
use crate::state::Snapshot;
use crate::storage::StateStorage;

/// Turns a state stored under an older `version` into the current shape.
pub type MigrateFn =
    Arc<dyn Fn(serde_json::Value, u32) -> Result<DurableState, StorageError> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableState {
    #[serde(default)]
    pub last_connected_wallet_name: Option<String>,
    #[serde(default)]
    pub last_connected_account_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord<S> {
    pub state: S,
    #[serde(default)]
    pub version: u32,
}

pub fn partialize(snapshot: &Snapshot) -> DurableState {
    DurableState {
        last_connected_wallet_name: snapshot.last_connected_wallet_name.clone(),
        last_connected_account_address: snapshot.last_connected_account_address.clone(),
    }
}

/// Overlays the persisted hints; every other field keeps its value.
pub fn merge(snapshot: Snapshot, durable: DurableState) -> Snapshot {
    Snapshot {
        last_connected_wallet_name: durable.last_connected_wallet_name,
        last_connected_account_address: durable.last_connected_account_address,
        ..snapshot
    }
}

pub fn encode_record(state: &DurableState, version: u32) -> Result<String, StorageError> {
    let record = PersistedRecord { state, version };
    Ok(serde_json::to_string(&record)?)
}

/// Decodes a stored record.
///
/// Returns `Ok(None)` when the record was written under a different version
/// and no migration is configured; the stale state is discarded.
pub fn decode_record(
    raw: &str,
    version: u32,
    migrate: Option<&MigrateFn>,
) -> Result<Option<DurableState>, StorageError> {
    let record: PersistedRecord<serde_json::Value> = serde_json::from_str(raw)?;
    if record.version == version {
        return Ok(Some(serde_json::from_value(record.state)?));
    }
    match migrate {
        Some(migrate) => {
            info!("Migrating persisted state from version {} to {}", record.version, version);
            migrate(record.state, record.version).map(Some)
        }
        None => {
            error!(
                "Persisted state has version {} but {} is expected and no migration is configured; ignoring it",
                record.version, version
            );
            Ok(None)
        }
    }
}

enum PersistEvent {
    Write(DurableState),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer for one storage key.
///
/// Writes are queued on an unbounded channel and applied in order by a
/// single task; the task exits once every handle is dropped.
pub struct Persister {
    storage: Arc<dyn StateStorage>,
    key: String,
    version: u32,
    migrate: Option<MigrateFn>,
    write_tx: mpsc::UnboundedSender<PersistEvent>,
}

impl Persister {
    /// Spawns the writer on the current tokio runtime. Without one, writes
    /// and flushes become no-ops and a warning is logged.
    pub fn spawn(
        storage: Arc<dyn StateStorage>,
        key: String,
        version: u32,
        migrate: Option<MigrateFn>,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_writer(Arc::clone(&storage), key.clone(), version, write_rx));
            }
            Err(_) => warn!("No tokio runtime available; '{}' will not be persisted", key),
        }
        Self {
            storage,
            key,
            version,
            migrate,
            write_tx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads and decodes the stored record, `Ok(None)` if there is nothing usable.
    pub async fn load(&self) -> Result<Option<DurableState>, StorageError> {
        match self.storage.get_item(&self.key).await? {
            Some(raw) => decode_record(&raw, self.version, self.migrate.as_ref()),
            None => Ok(None),
        }
    }

    /// Queues a write and returns immediately.
    pub fn write(&self, state: DurableState) {
        if self.write_tx.send(PersistEvent::Write(state)).is_err() {
            debug!("Persistence task for '{}' is gone; dropping write", self.key);
        }
    }

    /// Resolves once every write queued before this call has settled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.write_tx.send(PersistEvent::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Removes the stored record after pending writes have settled.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.flush().await;
        self.storage.remove_item(&self.key).await
    }
}

async fn run_writer(
    storage: Arc<dyn StateStorage>,
    key: String,
    version: u32,
    mut write_rx: mpsc::UnboundedReceiver<PersistEvent>,
) {
    info!("Persistence task started for key '{}'.", key);
    while let Some(event) = write_rx.recv().await {
        match event {
            PersistEvent::Write(state) => {
                let result = match encode_record(&state, version) {
                    Ok(raw) => storage.set_item(&key, &raw).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => debug!("Persisted {:?} under '{}'", state, key),
                    Err(e) => error!("Write error on '{}': {}", key, e),
                }
            }
            PersistEvent::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("Persistence task ended for key '{}'.", key);
}
