//! Connection state for an application talking to external wallets.
//!
//! [`WalletStore`] holds an immutable [`Snapshot`] of which wallets exist,
//! which one is connected and which accounts it exposes. A closed set of
//! transitions replaces the snapshot, notifies subscribers and persists the
//! last-connected hints through a [`StateStorage`] so they survive a restart.

pub mod errors;
pub mod persistence;
pub mod state;
pub mod storage;
pub mod store;
pub mod utils;
pub mod wallet;

// re‑export ergonomic entry points
pub use errors::StorageError;
pub use persistence::{DurableState, MigrateFn};
pub use state::{AutoConnectStatus, AutoConnectTarget, ConnectionStatus, Snapshot};
pub use storage::{MemoryStorage, StateStorage};
pub use store::{RegistryEvent, StoreConfig, SubscriptionId, WalletStore, DEFAULT_STORAGE_KEY};
pub use wallet::{Wallet, WalletAccount};
