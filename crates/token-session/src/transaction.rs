use crate::address::TxHash;
use crate::error::{Error, WalletError};

/// Single-slot transfer state: at most one transfer is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionState {
    in_flight: bool,
    pending_hash: Option<TxHash>,
    last_error: Option<WalletError>,
}

/// How a transfer attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Included with a success status.
    Confirmed(TxHash),
    /// The user declined the wallet prompt. Nothing is surfaced.
    Rejected,
    /// RPC failure or revert; stored as the transaction error.
    Failed(WalletError),
}

impl TransactionState {
    pub fn pending_hash(&self) -> Option<TxHash> {
        self.pending_hash
    }

    pub fn last_error(&self) -> Option<&WalletError> {
        self.last_error.as_ref()
    }

    /// Claim the slot for a new attempt, clearing the previous error.
    pub(crate) fn begin(&mut self) -> Result<(), Error> {
        if self.in_flight {
            return Err(Error::TransferInFlight);
        }
        self.in_flight = true;
        self.last_error = None;
        Ok(())
    }

    pub(crate) fn submitted(&mut self, hash: TxHash) {
        self.pending_hash = Some(hash);
    }

    /// Store a reportable failure. Rejections are never stored.
    pub(crate) fn fail(&mut self, error: WalletError) {
        if !error.is_rejection() {
            self.last_error = Some(error);
        }
    }

    /// Release the slot. Runs after every attempt whatever its outcome.
    pub(crate) fn finish(&mut self) {
        self.pending_hash = None;
        self.in_flight = false;
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_slot() {
        let mut state = TransactionState::default();
        state.begin().unwrap();
        assert!(matches!(state.begin(), Err(Error::TransferInFlight)));

        state.submitted(TxHash::new([1; 32]));
        assert_eq!(state.pending_hash(), Some(TxHash::new([1; 32])));

        state.finish();
        assert_eq!(state.pending_hash(), None);
        state.begin().unwrap();
    }

    #[test]
    fn test_begin_clears_previous_error() {
        let mut state = TransactionState::default();
        state.begin().unwrap();
        state.fail(WalletError::Reverted {
            hash: TxHash::new([2; 32]),
        });
        state.finish();
        assert!(state.last_error().is_some());

        state.begin().unwrap();
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_rejection_not_stored() {
        let mut state = TransactionState::default();
        state.begin().unwrap();
        state.fail(WalletError::Rejected);
        state.finish();
        assert_eq!(state, TransactionState::default());
    }
}
