//! Session controller: wallet connection lifecycle, polling and transfers.
//!
//! All session data lives in one [`State`] behind a mutex that is never held
//! across an await. Every asynchronous completion carries the generation it
//! started in and is applied only if that generation is still current; resets,
//! account changes and teardown bump the generation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::address::{Address, TxHash};
use crate::binding::TokenBinding;
use crate::client::{parse_accounts, ChainClient, ReceiptStatus};
use crate::config::SessionConfig;
use crate::error::{Error, WalletError};
use crate::provider::WalletProvider;
use crate::session::{Session, SessionPhase, SessionSnapshot};
use crate::token::{Amount, TokenDataCache, TokenMetadata};
use crate::transaction::{TransactionState, TransferOutcome};
use crate::view::Screen;

#[derive(Default)]
struct State {
    generation: u64,
    shut_down: bool,
    session: Session,
    cache: TokenDataCache,
    transaction: TransactionState,
    poller: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl State {
    fn stop_polling(&mut self) -> bool {
        match self.poller.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Back to the initial state. In-flight completions become stale.
    fn reset(&mut self) {
        self.stop_polling();
        self.generation += 1;
        self.session = Session::default();
        self.cache.clear();
        self.transaction = TransactionState::default();
    }
}

struct Inner {
    client: Option<ChainClient>,
    config: SessionConfig,
    state: Mutex<State>,
}

/// Owns the session for one token contract.
///
/// Dropping the controller tears it down: the poll timer and the account
/// listener are cancelled and late completions are discarded.
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// `provider` is `None` when no wallet was injected.
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        token: TokenBinding,
        config: SessionConfig,
    ) -> Self {
        let client = provider.map(|p| ChainClient::new(p, token, &config));
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot()
    }

    pub fn screen(&self) -> Screen {
        Screen::from_snapshot(&self.snapshot())
    }

    /// Request wallet access, check the network and initialize the session.
    /// Failures are logged; the session falls back to disconnected, or to its
    /// network error if it had one.
    pub async fn connect(&self) {
        self.inner.connect().await
    }

    /// React to the wallet's account list changing.
    pub async fn on_accounts_changed(&self, accounts: Vec<Address>) {
        self.inner.on_accounts_changed(accounts).await
    }

    /// Ensure the wallet is on the required network, requesting a switch if
    /// not. Returns whether the wallet ended up on the required network.
    pub async fn check_network(&self) -> bool {
        self.inner.check_network().await
    }

    /// Transfer `amount` from the session account to `to`.
    ///
    /// Only preconditions are returned as errors: no wallet, no account, or a
    /// transfer already in flight. Wallet and chain failures end up in the
    /// outcome and in the transaction state.
    ///
    /// The outcome reports what happened on chain. If the session is reset or
    /// torn down while the transfer is pending, the outcome is still returned
    /// (a transfer can come back `Confirmed`) but nothing is written to the
    /// session and no refresh runs.
    pub async fn transfer(&self, to: Address, amount: Amount) -> Result<TransferOutcome, Error> {
        self.inner.transfer(to, amount).await
    }

    pub fn dismiss_transaction_error(&self) {
        self.inner.lock().transaction.dismiss_error();
    }

    pub fn dismiss_network_error(&self) {
        self.inner.lock().session.dismiss_network_error();
    }

    /// Cancel the poll timer. Safe to call when none is running.
    pub fn stop_polling(&self) {
        if self.inner.lock().stop_polling() {
            debug!("polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .lock()
            .poller
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Tear the controller down. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        !state.shut_down && state.generation == generation
    }

    /// Apply `update` unless the context it was computed for is gone.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut State)) -> bool {
        let mut state = self.lock();
        if state.shut_down || state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "discarding stale completion"
            );
            return false;
        }
        update(&mut state);
        true
    }

    fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            wallet_detected: self.client.is_some(),
            session: state.session.clone(),
            metadata: state.cache.metadata().cloned(),
            balances: state.cache.balances().clone(),
            pending_hash: state.transaction.pending_hash(),
            transaction_error: state.transaction.last_error().cloned(),
            decimals: self.config.decimals,
        }
    }

    async fn connect(self: &Arc<Self>) {
        let Some(client) = self.client.as_ref() else {
            warn!("connect requested but no wallet provider was detected");
            return;
        };

        let generation = {
            let mut state = self.lock();
            if state.shut_down {
                return;
            }
            match state.session.phase() {
                SessionPhase::Connecting => {
                    debug!("connect already in progress");
                    return;
                }
                SessionPhase::Connected => {
                    debug!("already connected");
                    return;
                }
                SessionPhase::Disconnected | SessionPhase::NetworkError => {}
            }
            state.session.begin_connecting();
            state.generation
        };

        let account = match client.request_accounts().await {
            Ok(accounts) => {
                if accounts.is_empty() {
                    warn!("wallet returned no accounts");
                }
                accounts.first().copied()
            }
            Err(err) => {
                log_connection_error(&err);
                None
            }
        };
        let Some(account) = account else {
            self.apply(generation, |state| state.session.abandon_connecting());
            return;
        };
        // Account changes must reach the session even if the switch below fails.
        self.watch_accounts(client);

        if let Err(err) = self.ensure_network(client).await {
            warn!(error = %err, "network switch failed");
            let message = network_error_message(self.config.required_chain_id, &err);
            self.apply(generation, |state| state.session.network_failed(message));
            return;
        }

        // On the required network now; any earlier switch failure is moot.
        if !self.apply(generation, |state| state.session.dismiss_network_error()) {
            debug!("connect superseded");
            return;
        }
        self.initialize(generation, account).await;
    }

    /// Returns whether a switch was needed.
    async fn ensure_network(&self, client: &ChainClient) -> Result<bool, WalletError> {
        let required = self.config.required_chain_id;
        let current = client.network_version();
        if current == Some(required) {
            return Ok(false);
        }
        info!(required, current = ?current, "wallet is on the wrong network, requesting switch");
        client.switch_chain(required).await?;
        Ok(true)
    }

    async fn check_network(self: &Arc<Self>) -> bool {
        let Some(client) = self.client.as_ref() else {
            return false;
        };
        let generation = self.lock().generation;

        match self.ensure_network(client).await {
            Ok(false) => true,
            Ok(true) => {
                let reinit = {
                    let mut state = self.lock();
                    match state.session.account() {
                        Some(account) if !state.shut_down && state.generation == generation => {
                            state.reset();
                            state.session.begin_connecting();
                            Some((state.generation, account))
                        }
                        _ => None,
                    }
                };
                if let Some((generation, account)) = reinit {
                    self.initialize(generation, account).await;
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "network switch failed");
                let message = network_error_message(self.config.required_chain_id, &err);
                self.apply(generation, |state| state.session.network_failed(message));
                false
            }
        }
    }

    /// Fetch metadata, commit the account, then start polling.
    async fn initialize(self: &Arc<Self>, generation: u64, account: Address) {
        let Some(client) = self.client.as_ref() else {
            return;
        };

        let fetched = tokio::try_join!(client.name(), client.symbol(), client.total_supply());
        let (name, symbol, total_supply) = match fetched {
            Ok(values) => values,
            Err(err) => {
                error!(%account, error = %err, "failed to load token metadata");
                self.apply(generation, |state| state.session.abandon_connecting());
                return;
            }
        };

        let applied = self.apply(generation, |state| {
            state.session.connected(account);
            state.cache.set_metadata(TokenMetadata { name, symbol });
            state.cache.record_total_supply(total_supply);
        });
        if applied {
            info!(%account, "session initialized");
            self.start_polling(generation, account);
        }
    }

    async fn on_accounts_changed(self: &Arc<Self>, accounts: Vec<Address>) {
        let (generation, account) = {
            let mut state = self.lock();
            if state.shut_down {
                return;
            }
            // Polling stops before anything else so an old-account tick cannot
            // land in the new session.
            state.reset();
            let Some(account) = accounts.first().copied() else {
                info!("wallet reported no accounts, session reset");
                return;
            };
            state.session.begin_connecting();
            (state.generation, account)
        };

        info!(%account, "account changed, reinitializing");
        self.initialize(generation, account).await;
    }

    fn watch_accounts(self: &Arc<Self>, client: &ChainClient) {
        let mut state = self.lock();
        if state.shut_down || state.listener.is_some() {
            return;
        }
        let events = client.subscribe_accounts();
        state.listener = Some(tokio::spawn(listen_accounts(Arc::downgrade(self), events)));
    }

    fn start_polling(self: &Arc<Self>, generation: u64, account: Address) {
        let period = self.config.poll_interval();
        self.spawn_refresh(generation, account);
        let handle = tokio::spawn(poll_loop(Arc::downgrade(self), generation, account, period));

        let mut state = self.lock();
        if state.shut_down || state.generation != generation {
            handle.abort();
            return;
        }
        state.stop_polling();
        state.poller = Some(handle);
        debug!(%account, period_ms = period.as_millis() as u64, "polling started");
    }

    /// Fire-and-forget refresh of both quantities; neither waits on the other.
    fn spawn_refresh(self: &Arc<Self>, generation: u64, account: Address) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.refresh_balance(generation, account).await;
        });
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.refresh_total_supply(generation).await;
        });
    }

    async fn refresh_balance(&self, generation: u64, account: Address) -> bool {
        let Some(client) = self.client.as_ref() else {
            return false;
        };
        match client.balance_of(account).await {
            Ok(balance) => self.apply(generation, |state| state.cache.record_balance(balance)),
            Err(err) => {
                warn!(%account, error = %err, "balance refresh failed");
                false
            }
        }
    }

    async fn refresh_total_supply(&self, generation: u64) -> bool {
        let Some(client) = self.client.as_ref() else {
            return false;
        };
        match client.total_supply().await {
            Ok(total_supply) => {
                self.apply(generation, |state| state.cache.record_total_supply(total_supply))
            }
            Err(err) => {
                warn!(error = %err, "total supply refresh failed");
                false
            }
        }
    }

    async fn transfer(self: &Arc<Self>, to: Address, amount: Amount) -> Result<TransferOutcome, Error> {
        let client = self.client.as_ref().ok_or(WalletError::ProviderMissing)?;

        let (generation, from) = {
            let mut state = self.lock();
            if state.shut_down {
                return Err(Error::NotConnected);
            }
            let from = state.session.account().ok_or(Error::NotConnected)?;
            state.transaction.begin()?;
            (state.generation, from)
        };

        info!(%from, %to, %amount, "submitting transfer");
        let outcome = match self.submit_transfer(client, generation, from, to, &amount).await {
            Ok(hash) => TransferOutcome::Confirmed(hash),
            Err(err) if err.is_rejection() => {
                debug!("transfer rejected by user");
                TransferOutcome::Rejected
            }
            Err(err) => {
                error!(error = %err, "transfer failed");
                let stored = err.clone();
                self.apply(generation, |state| state.transaction.fail(stored));
                TransferOutcome::Failed(err)
            }
        };
        self.apply(generation, |state| state.transaction.finish());

        if let TransferOutcome::Confirmed(hash) = &outcome {
            info!(tx = %hash, "transfer confirmed");
            tokio::join!(
                self.refresh_balance(generation, from),
                self.refresh_total_supply(generation)
            );
        }
        Ok(outcome)
    }

    async fn submit_transfer(
        &self,
        client: &ChainClient,
        generation: u64,
        from: Address,
        to: Address,
        amount: &Amount,
    ) -> Result<TxHash, WalletError> {
        let hash = client.transfer(from, to, amount).await?;
        self.apply(generation, |state| state.transaction.submitted(hash));
        info!(tx = %hash, "transfer submitted, waiting for confirmation");

        match client.wait(hash).await? {
            ReceiptStatus::Success => Ok(hash),
            ReceiptStatus::Reverted => Err(WalletError::Reverted { hash }),
        }
    }

    fn shutdown(&self) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.stop_polling();
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }
        state.generation += 1;
        debug!("session controller shut down");
    }
}

async fn poll_loop(weak: Weak<Inner>, generation: u64, account: Address, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        if !inner.is_current(generation) {
            break;
        }
        inner.spawn_refresh(generation, account);
    }
}

async fn listen_accounts(weak: Weak<Inner>, mut events: broadcast::Receiver<Vec<String>>) {
    loop {
        let raw = match events.recv().await {
            Ok(raw) => raw,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "missed account change notifications");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let accounts = match parse_accounts(&raw) {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(error = %err, "ignoring malformed account change");
                continue;
            }
        };
        let Some(inner) = weak.upgrade() else {
            break;
        };
        inner.on_accounts_changed(accounts).await;
    }
}

fn log_connection_error(err: &WalletError) {
    if err.is_rejection() {
        info!("wallet connection declined by user");
    } else {
        error!(error = %err, "wallet connection failed");
    }
}

fn network_error_message(required: u64, err: &WalletError) -> String {
    match err {
        WalletError::Rejected => format!("Please switch your wallet to network {required}"),
        other => format!(
            "Could not switch to network {required}: {}",
            other.display_message()
        ),
    }
}
