use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, ReentrantMutex};

use crate::errors::StorageError;
use crate::persistence::{merge, partialize, MigrateFn, Persister};
use crate::state::{reselect_account, AutoConnectStatus, ConnectionStatus, Snapshot};
use crate::storage::StateStorage;
use crate::wallet::{Wallet, WalletAccount};

pub const DEFAULT_STORAGE_KEY: &str = "wallet-connection-info";

/// Everything needed to build a [`WalletStore`].
#[derive(Clone)]
pub struct StoreConfig {
    pub wallets: Vec<Arc<Wallet>>,
    pub auto_connect: bool,
    pub storage: Arc<dyn StateStorage>,
    pub storage_key: String,
    pub version: u32,
    pub migrate: Option<MigrateFn>,
}

impl StoreConfig {
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self {
            wallets: Vec::new(),
            auto_connect: false,
            storage,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            version: 0,
            migrate: None,
        }
    }

    pub fn with_wallets(mut self, wallets: Vec<Arc<Wallet>>) -> Self {
        self.wallets = wallets;
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_migrate(mut self, migrate: MigrateFn) -> Self {
        self.migrate = Some(migrate);
        self
    }
}

/// Notifications from the external wallet registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered {
        wallets: Vec<Arc<Wallet>>,
    },
    Unregistered {
        wallets: Vec<Arc<Wallet>>,
        wallet: Arc<Wallet>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Called with `(next, previous)` after every transition.
pub type Listener = Arc<dyn Fn(&Snapshot, &Snapshot) + Send + Sync>;

struct Inner {
    /// Held from swap through notification so listeners see transitions in
    /// swap order. Reentrant so a listener may itself call a transition.
    ordering: ReentrantMutex<()>,
    snapshot: Mutex<Arc<Snapshot>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
    hydrated: AtomicBool,
    persister: Persister,
}

/// The observable wallet connection state.
///
/// Cloning is cheap and every clone drives the same snapshot, so the store
/// can be handed to UI code, the auto-connect routine and the registry
/// listener alike. Transitions are synchronous; the resulting write to
/// storage happens on a background task.
#[derive(Clone)]
pub struct WalletStore {
    inner: Arc<Inner>,
}

impl WalletStore {
    /// Builds the store and overlays whatever hints are persisted under the
    /// configured key. Storage problems are logged and the defaults kept.
    ///
    /// Writes are performed by a task spawned on the current tokio runtime.
    /// Built outside a runtime the store still works but persists nothing.
    pub async fn new(config: StoreConfig) -> Self {
        let StoreConfig {
            wallets,
            auto_connect,
            storage,
            storage_key,
            version,
            migrate,
        } = config;

        let persister = Persister::spawn(storage, storage_key, version, migrate);
        let initial = Snapshot::initial(wallets, auto_connect);
        let (snapshot, hydrated) = match persister.load().await {
            Ok(Some(durable)) => {
                info!("Rehydrated {:?} from '{}'", durable, persister.key());
                (merge(initial, durable), true)
            }
            Ok(None) => {
                debug!("Nothing persisted under '{}'", persister.key());
                (initial, true)
            }
            Err(e) => {
                warn!("Could not rehydrate '{}', using defaults: {}", persister.key(), e);
                (initial, false)
            }
        };

        Self {
            inner: Arc::new(Inner {
                ordering: ReentrantMutex::new(()),
                snapshot: Mutex::new(Arc::new(snapshot)),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
                hydrated: AtomicBool::new(hydrated),
                persister,
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.snapshot.lock())
    }

    pub fn storage_key(&self) -> &str {
        self.inner.persister.key()
    }

    /// `false` when the last attempt to read storage failed.
    pub fn has_hydrated(&self) -> bool {
        self.inner.hydrated.load(Ordering::SeqCst)
    }

    /// Registers a listener; listeners run in registration order.
    ///
    /// A listener that captures a clone of this store keeps it alive (and its
    /// writer task running) until it is unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&Snapshot, &Snapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    // ── transitions ─────────────────────────────────────────────────────

    /// Sets the status as-is. Keeping it consistent with `current_wallet` is
    /// up to the caller; this is meant for the transient `Connecting` signal.
    pub fn set_connection_status(&self, connection_status: ConnectionStatus) {
        self.transition("set_connection_status", |s| Snapshot {
            connection_status,
            ..s.clone()
        });
    }

    pub fn set_auto_connection_status(&self, auto_connection_status: AutoConnectStatus) {
        self.transition("set_auto_connection_status", |s| Snapshot {
            auto_connection_status,
            ..s.clone()
        });
    }

    /// Records a successful connection. `selected_account` is trusted to be
    /// one of `accounts`.
    pub fn set_wallet_connected(
        &self,
        wallet: Arc<Wallet>,
        accounts: Vec<WalletAccount>,
        selected_account: Option<WalletAccount>,
    ) {
        self.transition("set_wallet_connected", |s| Snapshot {
            last_connected_wallet_name: Some(wallet.name.clone()),
            last_connected_account_address: selected_account.as_ref().map(|a| a.address.clone()),
            accounts,
            current_wallet: Some(wallet),
            current_account: selected_account,
            connection_status: ConnectionStatus::Connected,
            ..s.clone()
        });
    }

    /// Drops the live connection but keeps the last-connected hints so a
    /// later auto-connect can use them.
    pub fn set_wallet_disconnected(&self) {
        self.transition("set_wallet_disconnected", |s| Snapshot {
            accounts: Vec::new(),
            current_wallet: None,
            current_account: None,
            connection_status: ConnectionStatus::Disconnected,
            ..s.clone()
        });
    }

    /// `account` is trusted to belong to the current wallet.
    pub fn set_account_switched(&self, account: WalletAccount) {
        self.transition("set_account_switched", |s| Snapshot {
            last_connected_account_address: Some(account.address.clone()),
            current_account: Some(account),
            ..s.clone()
        });
    }

    pub fn set_wallet_registered(&self, wallets: Vec<Arc<Wallet>>) {
        self.transition("set_wallet_registered", |s| Snapshot {
            wallets,
            ..s.clone()
        });
    }

    /// Replaces the wallet list. If the removed wallet is the current one (by
    /// identity, not by name) the connection and the hints are reset as well.
    pub fn set_wallet_unregistered(&self, wallets: Vec<Arc<Wallet>>, wallet: &Arc<Wallet>) {
        self.transition("set_wallet_unregistered", |s| {
            if s.is_current_wallet(wallet) {
                info!("Current wallet '{}' was unregistered", wallet.name);
                Snapshot {
                    wallets,
                    accounts: Vec::new(),
                    current_wallet: None,
                    current_account: None,
                    last_connected_wallet_name: None,
                    last_connected_account_address: None,
                    connection_status: ConnectionStatus::Disconnected,
                    ..s.clone()
                }
            } else {
                Snapshot {
                    wallets,
                    ..s.clone()
                }
            }
        });
    }

    /// Replaces the exposed accounts and re-binds the current account by
    /// address, falling back to the first account (or none).
    pub fn update_wallet_accounts(&self, accounts: Vec<WalletAccount>) {
        self.transition("update_wallet_accounts", |s| Snapshot {
            current_account: reselect_account(s.current_account.as_ref(), &accounts),
            accounts,
            ..s.clone()
        });
    }

    pub fn apply_registry_event(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::Registered { wallets } => self.set_wallet_registered(wallets),
            RegistryEvent::Unregistered { wallets, wallet } => {
                self.set_wallet_unregistered(wallets, &wallet)
            }
        }
    }

    // ── persistence controls ────────────────────────────────────────────

    /// Re-reads storage and overlays the hints as a regular transition.
    ///
    /// When nothing usable is stored (no record, or a stale version without
    /// migration) the snapshot is left alone and no transition happens.
    pub async fn rehydrate(&self) -> Result<(), StorageError> {
        let loaded = self.inner.persister.load().await;
        self.inner.hydrated.store(loaded.is_ok(), Ordering::SeqCst);
        match loaded? {
            Some(durable) => self.transition("rehydrate", |s| merge(s.clone(), durable)),
            None => debug!("Nothing to rehydrate from '{}'", self.storage_key()),
        }
        Ok(())
    }

    /// Waits until every write queued so far has reached storage (or failed).
    pub async fn flush(&self) {
        self.inner.persister.flush().await;
    }

    /// Removes the persisted record. The in-memory snapshot is untouched,
    /// so the next transition writes the hints again.
    pub async fn clear_storage(&self) -> Result<(), StorageError> {
        self.inner.persister.clear().await
    }

    /// Swaps in the next snapshot and queues its write, then notifies listeners.
    ///
    /// Storage and listeners both see transitions in swap order. The snapshot
    /// lock itself is released before listeners run so they can read the store.
    fn transition(&self, name: &str, build: impl FnOnce(&Snapshot) -> Snapshot) {
        let _ordering = self.inner.ordering.lock();
        let (next, previous) = {
            let mut guard = self.inner.snapshot.lock();
            let next = Arc::new(build(&**guard));
            let previous = std::mem::replace(&mut *guard, Arc::clone(&next));
            self.inner.persister.write(partialize(&next));
            (next, previous)
        };
        debug!(
            "{}: {:?} -> {:?}",
            name, previous.connection_status, next.connection_status
        );

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&*next, &*previous);
        }
    }
}
