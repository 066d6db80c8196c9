//! The snapshot model: everything the store knows at one instant.
//!
//! A [`Snapshot`] is never mutated once published. Transitions build the next
//! snapshot from the previous one and the store swaps the reference.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::wallet::{Wallet, WalletAccount};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Whether the automatic reconnect attempt is enabled and whether it already ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoConnectStatus {
    #[default]
    Disabled,
    Idle,
    Settled,
}

impl AutoConnectStatus {
    pub fn initial(auto_connect: bool) -> Self {
        if auto_connect {
            AutoConnectStatus::Idle
        } else {
            AutoConnectStatus::Disabled
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub wallets: Vec<Arc<Wallet>>,
    pub accounts: Vec<WalletAccount>,
    pub current_wallet: Option<Arc<Wallet>>,
    pub current_account: Option<WalletAccount>,
    pub last_connected_wallet_name: Option<String>,
    pub last_connected_account_address: Option<String>,
    pub connection_status: ConnectionStatus,
    pub auto_connection_status: AutoConnectStatus,
}

/// What an auto-connect routine needs to attempt a silent reconnect.
#[derive(Debug, Clone)]
pub struct AutoConnectTarget {
    pub wallet: Arc<Wallet>,
    pub account_address: Option<String>,
}

impl Snapshot {
    /// The state a store starts from before any persisted hints are overlaid.
    pub fn initial(wallets: Vec<Arc<Wallet>>, auto_connect: bool) -> Self {
        Self {
            wallets,
            auto_connection_status: AutoConnectStatus::initial(auto_connect),
            ..Default::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.connection_status == ConnectionStatus::Connecting
    }

    pub fn is_disconnected(&self) -> bool {
        self.connection_status == ConnectionStatus::Disconnected
    }

    /// `true` when `wallet` is the current wallet by identity.
    pub fn is_current_wallet(&self, wallet: &Arc<Wallet>) -> bool {
        self.current_wallet
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, wallet))
    }

    /// The registered wallet named by the last-connected hint, if the
    /// automatic reconnect has not run yet and nothing is connected.
    pub fn auto_connect_target(&self) -> Option<AutoConnectTarget> {
        if self.auto_connection_status != AutoConnectStatus::Idle || !self.is_disconnected() {
            return None;
        }
        let name = self.last_connected_wallet_name.as_deref()?;
        let wallet = self.wallets.iter().find(|w| w.name == name)?;
        Some(AutoConnectTarget {
            wallet: Arc::clone(wallet),
            account_address: self.last_connected_account_address.clone(),
        })
    }
}

/// Picks the account that stays selected after the exposed account list changed.
///
/// Matches the previous selection by address since the upstream objects may
/// have been rebuilt; otherwise the first account wins.
pub(crate) fn reselect_account(
    previous: Option<&WalletAccount>,
    accounts: &[WalletAccount],
) -> Option<WalletAccount> {
    previous
        .and_then(|prev| accounts.iter().find(|a| a.address == prev.address))
        .or_else(|| accounts.first())
        .cloned()
}
