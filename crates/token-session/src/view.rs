//! Projection of a session snapshot onto what the presentation layer renders.

use crate::address::{Address, TxHash};
use crate::session::{SessionPhase, SessionSnapshot};
use crate::token::Amount;

/// The screen branch to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    /// No wallet capability was injected.
    NoWalletDetected,
    ConnectWallet { network_error: Option<String> },
    Loading,
    Dashboard(Dashboard),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub account: Address,
    pub token_name: String,
    pub token_symbol: String,
    pub balance: Amount,
    pub formatted_balance: String,
    pub panel: TokenPanel,
    /// Human-readable transaction error with a dismiss action.
    pub transaction_error: Option<String>,
}

/// The action area below the balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPanel {
    AwaitingConfirmation(TxHash),
    NoTokens,
    TransferForm,
}

impl Screen {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        if !snapshot.wallet_detected {
            return Screen::NoWalletDetected;
        }

        let session = &snapshot.session;
        let connect_wallet = || Screen::ConnectWallet {
            network_error: session.network_error().map(str::to_string),
        };
        if session.phase() == SessionPhase::NetworkError {
            return connect_wallet();
        }
        let Some(account) = session.account() else {
            if session.phase() == SessionPhase::Connecting {
                return Screen::Loading;
            }
            return connect_wallet();
        };

        let (Some(metadata), Some(balance)) = (&snapshot.metadata, &snapshot.balances.balance) else {
            return Screen::Loading;
        };

        let panel = match snapshot.pending_hash {
            Some(hash) => TokenPanel::AwaitingConfirmation(hash),
            None if balance.is_zero() => TokenPanel::NoTokens,
            None => TokenPanel::TransferForm,
        };

        Screen::Dashboard(Dashboard {
            account,
            token_name: metadata.name.clone(),
            token_symbol: metadata.symbol.clone(),
            balance: balance.clone(),
            formatted_balance: balance.format_units(snapshot.decimals),
            panel,
            transaction_error: snapshot
                .transaction_error
                .as_ref()
                .map(|e| e.display_message()),
        })
    }
}
