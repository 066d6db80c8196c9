use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::json;
use wallet_core::{
    AutoConnectStatus, ConnectionStatus, Snapshot, StateStorage, StoreConfig, Wallet,
    WalletAccount, WalletStore, DEFAULT_STORAGE_KEY,
};

/// Command-line arguments.
///
/// Every invocation builds a fresh store, the way a page reload would, so
/// only the persisted last-connected hints carry over between runs.
#[derive(Parser, Debug)]
#[command(name = "wallet-conn", version, subcommand_required = true)]
pub struct Args {
    /// Directory holding the persisted record (defaults to the user config dir)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Key the record is stored under
    #[arg(long, default_value = DEFAULT_STORAGE_KEY)]
    pub storage_key: String,

    /// Wallets reported by the registry (repeatable)
    #[arg(long = "wallet", default_value = "Demo Wallet")]
    pub wallets: Vec<String>,

    /// Enable the automatic reconnect attempt
    #[arg(long)]
    pub auto_connect: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the rehydrated snapshot and the auto-connect target
    Show,
    /// Connect to a registered wallet exposing the given accounts
    Connect {
        /// Name of a registered wallet
        name: String,
        /// Exposed account addresses (repeatable)
        #[arg(long = "account", required = true)]
        accounts: Vec<String>,
        /// Account to select; defaults to the first one
        #[arg(long)]
        select: Option<String>,
    },
    /// Disconnect; the last-connected hints are kept
    Disconnect,
    /// Reconnect to the last wallet, then drop it from the registry
    Unregister,
    /// Remove the persisted record
    Forget,
}

#[cfg(feature = "storage")]
fn open_storage(dir: Option<PathBuf>) -> anyhow::Result<Arc<dyn StateStorage>> {
    let storage = match dir {
        Some(dir) => wallet_storage::FileStorage::in_dir(dir),
        None => wallet_storage::FileStorage::new(),
    }
    .context("failed to open storage directory")?;
    info!("Using storage at {:?}", storage.dir());
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "storage"))]
fn open_storage(dir: Option<PathBuf>) -> anyhow::Result<Arc<dyn StateStorage>> {
    if dir.is_some() {
        warn!("Built without the `storage` feature; --storage-dir is ignored");
    }
    Ok(Arc::new(wallet_core::MemoryStorage::new()))
}

pub async fn run_cli(args: Args) -> anyhow::Result<()> {
    let storage = open_storage(args.storage_dir)?;
    let wallets = args
        .wallets
        .into_iter()
        .map(|name| Arc::new(Wallet::new(name).with_features(["standard:connect", "standard:events"])))
        .collect();
    let store = WalletStore::new(
        StoreConfig::new(storage)
            .with_wallets(wallets)
            .with_storage_key(args.storage_key)
            .with_auto_connect(args.auto_connect),
    )
    .await;
    if !store.has_hydrated() {
        warn!("Persisted record could not be read; starting from defaults");
    }

    match args.command {
        Command::Show => {}
        Command::Connect {
            name,
            accounts,
            select,
        } => connect(&store, &name, accounts, select)?,
        Command::Disconnect => store.set_wallet_disconnected(),
        Command::Unregister => unregister_last(&store)?,
        Command::Forget => {
            store.clear_storage().await.context("failed to remove record")?;
            info!("Removed '{}'", store.storage_key());
        }
    }

    store.flush().await;
    println!("{}", serde_json::to_string_pretty(&report(&store.snapshot()))?);
    Ok(())
}

fn find_wallet(snapshot: &Snapshot, name: &str) -> anyhow::Result<Arc<Wallet>> {
    match snapshot.wallets.iter().find(|w| w.name == name) {
        Some(wallet) => Ok(Arc::clone(wallet)),
        None => bail!("no registered wallet named '{}'", name),
    }
}

fn connect(
    store: &WalletStore,
    name: &str,
    addresses: Vec<String>,
    select: Option<String>,
) -> anyhow::Result<()> {
    let wallet = find_wallet(&store.snapshot(), name)?;
    let accounts: Vec<WalletAccount> = addresses.into_iter().map(WalletAccount::new).collect();
    let selected = match select {
        Some(address) => match accounts.iter().find(|a| a.address == address) {
            Some(account) => Some(account.clone()),
            None => bail!("'{}' is not among the exposed accounts", address),
        },
        None => accounts.first().cloned(),
    };

    store.set_connection_status(ConnectionStatus::Connecting);
    store.set_wallet_connected(wallet, accounts, selected);
    if store.snapshot().auto_connection_status == AutoConnectStatus::Idle {
        store.set_auto_connection_status(AutoConnectStatus::Settled);
    }
    Ok(())
}

fn unregister_last(store: &WalletStore) -> anyhow::Result<()> {
    let snapshot = store.snapshot();
    let Some(name) = snapshot.last_connected_wallet_name.as_deref() else {
        bail!("nothing was connected before");
    };
    let wallet = find_wallet(&snapshot, name)?;
    let accounts: Vec<WalletAccount> = snapshot
        .last_connected_account_address
        .iter()
        .map(WalletAccount::new)
        .collect();
    let selected = accounts.first().cloned();
    store.set_wallet_connected(Arc::clone(&wallet), accounts, selected);

    let remaining = snapshot
        .wallets
        .iter()
        .filter(|w| !Arc::ptr_eq(w, &wallet))
        .cloned()
        .collect();
    store.set_wallet_unregistered(remaining, &wallet);
    Ok(())
}

fn report(snapshot: &Snapshot) -> serde_json::Value {
    let target = snapshot.auto_connect_target().map(|target| {
        json!({
            "wallet": target.wallet.name,
            "accountAddress": target.account_address,
        })
    });
    json!({
        "snapshot": snapshot,
        "autoConnectTarget": target,
    })
}
