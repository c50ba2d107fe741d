use std::sync::{Arc, Weak};

use rust_decimal::{Decimal, RoundingStrategy};
use shared::{
    domain::{BalanceAccuracy, ProviderDescriptor, ProviderKind, WalletSession},
    error::ConnectError,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use wallet_integration::{AccountsEvent, HostEnvironment, InjectedProvider, ProviderRequestError};

use crate::task::TaskGuard;

/// Provider balances are base-1e18 fixed point.
const BASE_UNIT_SCALE: u32 = 18;
const DISPLAY_BALANCE_DP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Non-error results of a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(WalletSession),
    NotImplemented(ProviderKind),
    /// A disconnect arrived while the provider prompt was open; the late
    /// result was dropped.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Connected(WalletSession),
    AccountChanged { address: String },
    /// The provider dropped every account. `generation` is the connector's
    /// session generation right after the teardown.
    SessionEnded { generation: u64 },
    Disconnected,
}

struct ConnectorState {
    phase: ConnectionPhase,
    session: WalletSession,
    /// Bumped when a connect starts or a disconnect cancels one.
    attempt: u64,
    /// Bumped whenever a session is installed or torn down. The account
    /// subscription only acts while this still matches its own.
    generation: u64,
    accounts_task: Option<TaskGuard>,
}

pub struct WalletConnector {
    host: Arc<dyn HostEnvironment>,
    placeholder_balance: Decimal,
    state: Mutex<ConnectorState>,
    events: broadcast::Sender<ConnectorEvent>,
}

pub fn list_providers() -> Vec<ProviderDescriptor> {
    ProviderKind::ALL
        .iter()
        .map(|kind| kind.descriptor())
        .collect()
}

/// Converts a hex quantity of base units into a native amount rounded to
/// four decimal places.
pub fn base_units_to_native(raw_hex: &str) -> Result<Decimal, ConnectError> {
    let digits = raw_hex
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    if digits.is_empty() {
        return Err(ConnectError::ProviderError(format!(
            "malformed balance quantity '{raw_hex}'"
        )));
    }
    let raw = u128::from_str_radix(digits, 16).map_err(|err| {
        ConnectError::ProviderError(format!("malformed balance quantity '{raw_hex}': {err}"))
    })?;
    let raw = i128::try_from(raw).map_err(|_| {
        ConnectError::ProviderError(format!("balance quantity '{raw_hex}' is out of range"))
    })?;
    let native = Decimal::try_from_i128_with_scale(raw, BASE_UNIT_SCALE).map_err(|_| {
        ConnectError::ProviderError(format!("balance quantity '{raw_hex}' is out of range"))
    })?;
    Ok(native.round_dp_with_strategy(DISPLAY_BALANCE_DP, RoundingStrategy::MidpointAwayFromZero))
}

fn map_request_error(err: ProviderRequestError) -> ConnectError {
    match err {
        ProviderRequestError::UserRejected => ConnectError::ConnectionRejected,
        ProviderRequestError::Fault(message) => ConnectError::ProviderError(message),
    }
}

impl WalletConnector {
    pub fn new(host: Arc<dyn HostEnvironment>, placeholder_balance: Decimal) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            host,
            placeholder_balance,
            state: Mutex::new(ConnectorState {
                phase: ConnectionPhase::Disconnected,
                session: WalletSession::default(),
                attempt: 0,
                generation: 0,
                accounts_task: None,
            }),
            events,
        })
    }

    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        list_providers()
    }

    pub fn is_provider_available(&self, kind: ProviderKind) -> bool {
        if !kind.is_injected() {
            return true;
        }
        self.host.injected_provider(kind).is_some()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.state.lock().await.phase
    }

    pub async fn session(&self) -> WalletSession {
        self.state.lock().await.session.clone()
    }

    pub async fn session_generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    pub async fn connect(self: &Arc<Self>, kind: ProviderKind) -> Result<ConnectOutcome, ConnectError> {
        let (attempt, provider) = {
            let mut guard = self.state.lock().await;
            if guard.phase == ConnectionPhase::Connecting {
                return Err(ConnectError::AlreadyConnecting);
            }
            if !kind.is_injected() {
                info!("wallet: provider={} not implemented", kind.display_name());
                return Ok(ConnectOutcome::NotImplemented(kind));
            }
            let Some(provider) = self.host.injected_provider(kind) else {
                warn!("wallet: provider={} not found in host", kind.display_name());
                return Err(ConnectError::ProviderNotFound(kind));
            };
            guard.attempt += 1;
            guard.phase = ConnectionPhase::Connecting;
            (guard.attempt, provider)
        };

        debug!(attempt, provider = kind.display_name(), "wallet: awaiting approval");
        let result = self.establish_session(kind, provider.as_ref()).await;

        let mut guard = self.state.lock().await;
        if guard.attempt != attempt || guard.phase != ConnectionPhase::Connecting {
            debug!(attempt, "wallet: dropping late connect resolution");
            return Ok(ConnectOutcome::Abandoned);
        }

        let session = match result {
            Ok(session) => session,
            Err(err) => {
                guard.phase = if guard.session.connected {
                    ConnectionPhase::Connected
                } else {
                    ConnectionPhase::Disconnected
                };
                warn!("wallet: connect failed provider={} error={err}", kind.display_name());
                return Err(err);
            }
        };

        guard.generation += 1;
        let accounts_task = self.spawn_accounts_task(guard.generation, provider.subscribe_accounts());
        if let Some(previous) = guard.accounts_task.replace(accounts_task) {
            previous.cancel();
        }
        guard.session = session.clone();
        guard.phase = ConnectionPhase::Connected;
        drop(guard);

        info!(
            "wallet: connected provider={} address={} balance={} accuracy={:?}",
            kind.display_name(),
            session.short_address(),
            session.balance_native,
            session.balance_accuracy
        );
        let _ = self.events.send(ConnectorEvent::Connected(session.clone()));
        Ok(ConnectOutcome::Connected(session))
    }

    async fn establish_session(
        &self,
        kind: ProviderKind,
        provider: &dyn InjectedProvider,
    ) -> Result<WalletSession, ConnectError> {
        let accounts = provider
            .request_accounts()
            .await
            .map_err(map_request_error)?;
        let address = accounts
            .into_iter()
            .next()
            .filter(|account| !account.is_empty())
            .ok_or_else(|| ConnectError::ProviderError("provider returned no accounts".into()))?;

        match kind {
            ProviderKind::PrimaryInjected => {
                let raw = provider
                    .get_balance(&address)
                    .await
                    .map_err(map_request_error)?;
                let balance = base_units_to_native(&raw)?;
                Ok(WalletSession::connected(kind, address, balance, BalanceAccuracy::Exact))
            }
            ProviderKind::SecondaryInjected => {
                let (balance, accuracy) = self.secondary_balance(provider, &address).await;
                Ok(WalletSession::connected(kind, address, balance, accuracy))
            }
            ProviderKind::RemoteProtocol => Err(ConnectError::ProviderError(
                "remote protocol has no injected session".into(),
            )),
        }
    }

    /// Balance support varies across secondary wallets; anything short of a
    /// clean answer falls back to the configured placeholder.
    async fn secondary_balance(
        &self,
        provider: &dyn InjectedProvider,
        address: &str,
    ) -> (Decimal, BalanceAccuracy) {
        if !provider.exposes_balance() {
            return (self.placeholder_balance, BalanceAccuracy::Approximate);
        }
        let queried = match provider.get_balance(address).await {
            Ok(raw) => base_units_to_native(&raw),
            Err(err) => Err(map_request_error(err)),
        };
        match queried {
            Ok(balance) => (balance, BalanceAccuracy::Exact),
            Err(err) => {
                warn!("wallet: secondary balance unavailable, using placeholder error={err}");
                (self.placeholder_balance, BalanceAccuracy::Approximate)
            }
        }
    }

    fn spawn_accounts_task(
        self: &Arc<Self>,
        generation: u64,
        mut accounts: broadcast::Receiver<AccountsEvent>,
    ) -> TaskGuard {
        let connector: Weak<Self> = Arc::downgrade(self);
        TaskGuard::spawn("wallet_accounts", async move {
            loop {
                let event = match accounts.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("wallet: account notifications lagged skipped={skipped}");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(connector) = connector.upgrade() else {
                    break;
                };
                let AccountsEvent::AccountsChanged(list) = event;
                if !connector.apply_accounts_change(generation, list).await {
                    break;
                }
            }
        })
    }

    /// Returns false once the session this subscription belongs to is gone.
    async fn apply_accounts_change(&self, generation: u64, accounts: Vec<String>) -> bool {
        let mut guard = self.state.lock().await;
        if guard.generation != generation || !guard.session.connected {
            return false;
        }

        match accounts.into_iter().next().filter(|a| !a.is_empty()) {
            Some(address) => {
                if guard.session.address != address {
                    guard.session.set_address(address.clone());
                    drop(guard);
                    info!("wallet: active account changed");
                    let _ = self.events.send(ConnectorEvent::AccountChanged { address });
                }
                true
            }
            None => {
                guard.session = WalletSession::default();
                guard.generation += 1;
                // An attempt already in flight keeps its own phase.
                if guard.phase == ConnectionPhase::Connected {
                    guard.phase = ConnectionPhase::Disconnected;
                }
                if let Some(task) = guard.accounts_task.take() {
                    task.detach();
                }
                let generation = guard.generation;
                drop(guard);
                info!("wallet: provider reported no accounts, session ended generation={generation}");
                let _ = self.events.send(ConnectorEvent::SessionEnded { generation });
                false
            }
        }
    }

    /// Local teardown only; injected providers offer no disconnect call.
    pub async fn disconnect(&self) {
        let task = {
            let mut guard = self.state.lock().await;
            guard.attempt += 1;
            guard.generation += 1;
            guard.phase = ConnectionPhase::Disconnected;
            guard.session = WalletSession::default();
            guard.accounts_task.take()
        };
        if let Some(task) = task {
            task.cancel();
        }
        info!("wallet: disconnected");
        let _ = self.events.send(ConnectorEvent::Disconnected);
    }
}

#[cfg(test)]
#[path = "tests/wallet_connector_tests.rs"]
mod tests;
