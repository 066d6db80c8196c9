use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::LevelFilter;
use serde_json::json;
use wallet_core::{
    AutoConnectStatus, ConnectionStatus, DurableState, MemoryStorage, MigrateFn, StateStorage,
    StoreConfig, Wallet, WalletAccount, WalletStore, DEFAULT_STORAGE_KEY,
};

mod common;
use common::recording_storage::RecordingStorage;

fn init_logs() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn unique_key() -> String {
    format!("wallet-test-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
async fn hints_survive_a_fresh_store_and_nothing_else_does() {
    init_logs();
    let storage = MemoryStorage::new();
    let key = unique_key();
    let foo = Arc::new(Wallet::new("Foo"));

    let first = WalletStore::new(
        StoreConfig::new(Arc::new(storage.clone()))
            .with_wallets(vec![Arc::clone(&foo)])
            .with_storage_key(&key)
            .with_auto_connect(true),
    )
    .await;
    first.set_wallet_connected(
        Arc::clone(&foo),
        vec![WalletAccount::new("0xA")],
        Some(WalletAccount::new("0xA")),
    );
    first.set_auto_connection_status(AutoConnectStatus::Settled);
    first.flush().await;

    let second = WalletStore::new(
        StoreConfig::new(Arc::new(storage.clone()))
            .with_wallets(vec![Arc::clone(&foo)])
            .with_storage_key(&key)
            .with_auto_connect(true),
    )
    .await;

    let snapshot = second.snapshot();
    assert!(second.has_hydrated());
    assert_eq!(snapshot.last_connected_wallet_name.as_deref(), Some("Foo"));
    assert_eq!(snapshot.last_connected_account_address.as_deref(), Some("0xA"));
    assert!(snapshot.accounts.is_empty());
    assert!(snapshot.current_wallet.is_none());
    assert!(snapshot.current_account.is_none());
    assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
    assert_eq!(snapshot.auto_connection_status, AutoConnectStatus::Idle);

    let target = snapshot.auto_connect_target().expect("auto-connect target");
    assert!(Arc::ptr_eq(&target.wallet, &foo));
    assert_eq!(target.account_address.as_deref(), Some("0xA"));
}

#[tokio::test]
async fn every_transition_writes_the_durable_subset() {
    init_logs();
    let storage = RecordingStorage::new();
    let foo = Arc::new(Wallet::new("Foo"));
    let store = WalletStore::new(
        StoreConfig::new(storage.clone()).with_wallets(vec![Arc::clone(&foo)]),
    )
    .await;

    store.set_connection_status(ConnectionStatus::Connecting);
    store.set_wallet_connected(
        Arc::clone(&foo),
        vec![WalletAccount::new("0xA"), WalletAccount::new("0xB")],
        Some(WalletAccount::new("0xA")),
    );
    store.set_account_switched(WalletAccount::new("0xB"));
    store.set_wallet_disconnected();
    store.flush().await;

    let history = storage.write_history();
    assert_eq!(history.len(), 4, "one write per transition");
    assert!(history.iter().all(|(key, _)| key == DEFAULT_STORAGE_KEY));

    let states: Vec<serde_json::Value> = history
        .iter()
        .map(|(_, raw)| serde_json::from_str::<serde_json::Value>(raw).unwrap()["state"].clone())
        .collect();
    assert_eq!(
        states[0],
        json!({ "lastConnectedWalletName": null, "lastConnectedAccountAddress": null })
    );
    assert_eq!(
        states[1],
        json!({ "lastConnectedWalletName": "Foo", "lastConnectedAccountAddress": "0xA" })
    );
    assert_eq!(
        states[2],
        json!({ "lastConnectedWalletName": "Foo", "lastConnectedAccountAddress": "0xB" })
    );
    assert_eq!(states[3], states[2], "disconnect keeps the hints");
}

#[tokio::test]
async fn record_layout_carries_the_configured_version() {
    init_logs();
    let storage = RecordingStorage::new();
    let store = WalletStore::new(StoreConfig::new(storage.clone()).with_version(2)).await;

    store.set_auto_connection_status(AutoConnectStatus::Settled);
    store.flush().await;

    let raw = storage.raw(DEFAULT_STORAGE_KEY).expect("a record");
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record["version"], json!(2));
    assert!(record["state"].is_object());
    assert_eq!(record.as_object().unwrap().len(), 2, "only state and version are stored");
}

#[tokio::test]
async fn unreadable_storage_falls_back_to_defaults() {
    init_logs();
    let storage = RecordingStorage::with_item(
        DEFAULT_STORAGE_KEY,
        r#"{"state":{"lastConnectedWalletName":"Foo"},"version":0}"#,
    );
    storage.fail_reads.store(true, Ordering::SeqCst);

    let store = WalletStore::new(StoreConfig::new(storage.clone())).await;

    assert!(!store.has_hydrated());
    assert!(store.snapshot().last_connected_wallet_name.is_none());
}

#[tokio::test]
async fn malformed_record_falls_back_to_defaults() {
    init_logs();
    let storage = RecordingStorage::with_item(DEFAULT_STORAGE_KEY, "{ not json");

    let store = WalletStore::new(StoreConfig::new(storage.clone())).await;

    assert!(!store.has_hydrated());
    assert!(store.snapshot().last_connected_wallet_name.is_none());
}

#[tokio::test]
async fn failed_writes_do_not_affect_transitions() {
    init_logs();
    let storage = RecordingStorage::new();
    storage.fail_writes.store(true, Ordering::SeqCst);
    let foo = Arc::new(Wallet::new("Foo"));
    let store = WalletStore::new(StoreConfig::new(storage.clone())).await;

    store.set_wallet_connected(Arc::clone(&foo), vec![], None);
    store.flush().await;

    assert!(store.snapshot().is_connected());
    assert!(storage.write_history().is_empty());
    assert!(storage.raw(DEFAULT_STORAGE_KEY).is_none());
}

#[tokio::test]
async fn stale_version_is_discarded_without_migration() {
    init_logs();
    let storage = RecordingStorage::with_item(
        DEFAULT_STORAGE_KEY,
        r#"{"state":{"lastConnectedWalletName":"Foo"},"version":0}"#,
    );

    let store = WalletStore::new(StoreConfig::new(storage.clone()).with_version(1)).await;

    assert!(store.has_hydrated());
    assert!(store.snapshot().last_connected_wallet_name.is_none());
}

#[tokio::test]
async fn stale_version_is_migrated_when_configured() {
    init_logs();
    let storage = RecordingStorage::with_item(
        DEFAULT_STORAGE_KEY,
        r#"{"state":{"walletName":"Foo","account":"0xA"},"version":0}"#,
    );
    let migrate: MigrateFn = Arc::new(|state, _from| {
        Ok(DurableState {
            last_connected_wallet_name: state["walletName"].as_str().map(str::to_string),
            last_connected_account_address: state["account"].as_str().map(str::to_string),
        })
    });

    let store = WalletStore::new(
        StoreConfig::new(storage.clone())
            .with_version(1)
            .with_migrate(migrate),
    )
    .await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.last_connected_wallet_name.as_deref(), Some("Foo"));
    assert_eq!(snapshot.last_connected_account_address.as_deref(), Some("0xA"));
}

#[tokio::test]
async fn clear_storage_removes_the_record_but_not_the_snapshot() {
    init_logs();
    let storage = RecordingStorage::new();
    let foo = Arc::new(Wallet::new("Foo"));
    let store = WalletStore::new(StoreConfig::new(storage.clone())).await;
    store.set_wallet_connected(Arc::clone(&foo), vec![], None);

    store.clear_storage().await.expect("clear should succeed");

    assert!(storage.raw(DEFAULT_STORAGE_KEY).is_none());
    assert_eq!(store.snapshot().last_connected_wallet_name.as_deref(), Some("Foo"));
}

#[tokio::test]
async fn rehydrate_picks_up_external_changes_as_a_transition() {
    init_logs();
    let storage = MemoryStorage::new();
    let key = unique_key();
    let store = WalletStore::new(
        StoreConfig::new(Arc::new(storage.clone())).with_storage_key(&key),
    )
    .await;
    let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    store.subscribe(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    storage
        .set_item(
            &key,
            r#"{"state":{"lastConnectedWalletName":"Bar","lastConnectedAccountAddress":"0xC"},"version":0}"#,
        )
        .await
        .unwrap();
    store.rehydrate().await.expect("rehydrate should succeed");

    let snapshot = store.snapshot();
    assert_eq!(snapshot.last_connected_wallet_name.as_deref(), Some("Bar"));
    assert_eq!(snapshot.last_connected_account_address.as_deref(), Some("0xC"));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn writes_are_applied_in_transition_order() {
    init_logs();
    let storage = RecordingStorage::new();
    let store = WalletStore::new(StoreConfig::new(storage.clone())).await;

    for i in 0..50 {
        store.set_account_switched(WalletAccount::new(format!("0x{i}")));
    }
    store.flush().await;

    assert_eq!(storage.write_history().len(), 50);
    assert_eq!(
        storage.stored_state(DEFAULT_STORAGE_KEY).unwrap()["lastConnectedAccountAddress"],
        json!("0x49")
    );
}

#[tokio::test]
async fn rehydrate_after_clear_keeps_the_hints() {
    init_logs();
    let storage = RecordingStorage::new();
    let foo = Arc::new(Wallet::new("Foo"));
    let store = WalletStore::new(StoreConfig::new(storage.clone())).await;
    store.set_wallet_connected(
        Arc::clone(&foo),
        vec![WalletAccount::new("0xA")],
        Some(WalletAccount::new("0xA")),
    );
    store.clear_storage().await.expect("clear should succeed");
    let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    store.subscribe(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.rehydrate().await.expect("rehydrate should succeed");

    let snapshot = store.snapshot();
    assert!(store.has_hydrated());
    assert_eq!(snapshot.last_connected_wallet_name.as_deref(), Some("Foo"));
    assert_eq!(snapshot.last_connected_account_address.as_deref(), Some("0xA"));
    assert!(snapshot.is_connected());
    assert_eq!(notified.load(Ordering::SeqCst), 0, "nothing stored, nothing changed");
}

#[tokio::test]
async fn rehydrate_ignores_a_stale_record_without_migration() {
    init_logs();
    let storage = RecordingStorage::new();
    let foo = Arc::new(Wallet::new("Foo"));
    let store = WalletStore::new(StoreConfig::new(storage.clone()).with_version(1)).await;
    store.set_wallet_connected(Arc::clone(&foo), vec![], None);
    store.flush().await;

    storage
        .set_item(
            DEFAULT_STORAGE_KEY,
            r#"{"state":{"lastConnectedWalletName":"Bar"},"version":0}"#,
        )
        .await
        .unwrap();
    store.rehydrate().await.expect("rehydrate should succeed");

    assert_eq!(store.snapshot().last_connected_wallet_name.as_deref(), Some("Foo"));
}
