use crate::address::{Address, TxHash};
use crate::error::WalletError;
use crate::token::{TokenBalanceState, TokenMetadata};

/// Connection phase of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    NetworkError,
}

/// Selected account and network error.
///
/// `account` is only set once initialization for it has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    phase: SessionPhase,
    account: Option<Address>,
    network_error: Option<String>,
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn network_error(&self) -> Option<&str> {
        self.network_error.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected && self.account.is_some()
    }

    /// The network error survives until a connect completes, so an
    /// abandoned attempt falls back to `NetworkError`.
    pub(crate) fn begin_connecting(&mut self) {
        self.phase = SessionPhase::Connecting;
    }

    /// Back out of a connect attempt that did not complete.
    pub(crate) fn abandon_connecting(&mut self) {
        if self.phase == SessionPhase::Connecting {
            self.phase = self.settled_phase();
        }
    }

    fn settled_phase(&self) -> SessionPhase {
        if self.network_error.is_some() {
            SessionPhase::NetworkError
        } else if self.account.is_some() {
            SessionPhase::Connected
        } else {
            SessionPhase::Disconnected
        }
    }

    pub(crate) fn connected(&mut self, account: Address) {
        self.phase = SessionPhase::Connected;
        self.account = Some(account);
        self.network_error = None;
    }

    pub(crate) fn network_failed(&mut self, message: String) {
        self.phase = SessionPhase::NetworkError;
        self.network_error = Some(message);
    }

    /// Clear the network error. No retry is attempted.
    pub(crate) fn dismiss_network_error(&mut self) {
        self.network_error = None;
        if self.phase == SessionPhase::NetworkError {
            self.phase = self.settled_phase();
        }
    }
}

/// Point-in-time copy of everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub wallet_detected: bool,
    pub session: Session,
    pub metadata: Option<TokenMetadata>,
    pub balances: TokenBalanceState,
    pub pending_hash: Option<TxHash>,
    pub transaction_error: Option<WalletError>,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_lifecycle() {
        let mut session = Session::default();
        assert_eq!(session.phase(), SessionPhase::Disconnected);

        session.begin_connecting();
        assert_eq!(session.phase(), SessionPhase::Connecting);
        assert!(session.account().is_none());

        let account = Address::new([0xaa; 20]);
        session.connected(account);
        assert!(session.is_connected());
        assert_eq!(session.account(), Some(account));
    }

    #[test]
    fn test_network_error_dismissal() {
        let mut session = Session::default();
        session.begin_connecting();
        session.network_failed("wrong network".to_string());
        assert_eq!(session.phase(), SessionPhase::NetworkError);
        assert_eq!(session.network_error(), Some("wrong network"));

        session.dismiss_network_error();
        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(session.network_error().is_none());
    }

    #[test]
    fn test_abandon_keeps_existing_account() {
        let mut session = Session::default();
        session.connected(Address::new([1; 20]));
        session.begin_connecting();
        session.abandon_connecting();
        assert_eq!(session.phase(), SessionPhase::Connected);

        let mut fresh = Session::default();
        fresh.begin_connecting();
        fresh.abandon_connecting();
        assert_eq!(fresh.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn test_abandon_restores_network_error() {
        let mut session = Session::default();
        session.connected(Address::new([1; 20]));
        session.network_failed("wrong network".to_string());

        session.begin_connecting();
        session.abandon_connecting();
        assert_eq!(session.phase(), SessionPhase::NetworkError);
        assert_eq!(session.network_error(), Some("wrong network"));

        session.begin_connecting();
        session.connected(Address::new([1; 20]));
        assert_eq!(session.phase(), SessionPhase::Connected);
        assert!(session.network_error().is_none());
    }
}
