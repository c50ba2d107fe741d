//! In-process provider and host used by the demo binary and tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::domain::ProviderKind;
use tokio::sync::broadcast;

use crate::{
    AccountsEvent, HostEnvironment, InjectedProvider, ProviderRequestError, USER_REJECTED_REQUEST,
};

pub struct MemoryProvider {
    accounts: Vec<String>,
    balance_hex: String,
    exposes_balance: bool,
    approval_delay: Duration,
    accounts_error: Option<ProviderRequestError>,
    balance_error: Option<ProviderRequestError>,
    account_requests: AtomicUsize,
    accounts_tx: broadcast::Sender<AccountsEvent>,
}

impl MemoryProvider {
    pub fn new(account: impl Into<String>, balance_hex: impl Into<String>) -> Self {
        let (accounts_tx, _) = broadcast::channel(16);
        Self {
            accounts: vec![account.into()],
            balance_hex: balance_hex.into(),
            exposes_balance: true,
            approval_delay: Duration::ZERO,
            accounts_error: None,
            balance_error: None,
            account_requests: AtomicUsize::new(0),
            accounts_tx,
        }
    }

    /// The user declines the approval prompt.
    pub fn rejecting(mut self) -> Self {
        self.accounts_error = Some(ProviderRequestError::from_rpc(
            USER_REJECTED_REQUEST,
            "User rejected the request.",
        ));
        self
    }

    pub fn failing_accounts(mut self, message: impl Into<String>) -> Self {
        self.accounts_error = Some(ProviderRequestError::Fault(message.into()));
        self
    }

    pub fn failing_balance(mut self, message: impl Into<String>) -> Self {
        self.balance_error = Some(ProviderRequestError::Fault(message.into()));
        self
    }

    pub fn without_balance(mut self) -> Self {
        self.exposes_balance = false;
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<String>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Time the approval prompt stays open before `request_accounts` resolves.
    pub fn with_approval_delay(mut self, delay: Duration) -> Self {
        self.approval_delay = delay;
        self
    }

    pub fn account_requests(&self) -> usize {
        self.account_requests.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.accounts_tx.receiver_count()
    }

    /// Simulates the wallet reporting a new account list.
    pub fn emit_accounts_changed(&self, accounts: Vec<String>) {
        let _ = self
            .accounts_tx
            .send(AccountsEvent::AccountsChanged(accounts));
    }
}

#[async_trait]
impl InjectedProvider for MemoryProvider {
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderRequestError> {
        self.account_requests.fetch_add(1, Ordering::SeqCst);
        if !self.approval_delay.is_zero() {
            tokio::time::sleep(self.approval_delay).await;
        }
        if let Some(err) = &self.accounts_error {
            return Err(err.clone());
        }
        Ok(self.accounts.clone())
    }

    async fn get_balance(&self, _address: &str) -> Result<String, ProviderRequestError> {
        if let Some(err) = &self.balance_error {
            return Err(err.clone());
        }
        Ok(self.balance_hex.clone())
    }

    fn exposes_balance(&self) -> bool {
        self.exposes_balance
    }

    fn subscribe_accounts(&self) -> broadcast::Receiver<AccountsEvent> {
        self.accounts_tx.subscribe()
    }
}

#[derive(Default)]
pub struct MemoryHost {
    providers: HashMap<ProviderKind, Arc<dyn InjectedProvider>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn InjectedProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }
}

impl HostEnvironment for MemoryHost {
    fn injected_provider(&self, kind: ProviderKind) -> Option<Arc<dyn InjectedProvider>> {
        if !kind.is_injected() {
            return None;
        }
        self.providers.get(&kind).cloned()
    }
}
