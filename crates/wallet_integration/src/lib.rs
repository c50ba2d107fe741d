use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::ProviderKind;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod memory;

/// EIP-1193 code for "the user rejected the request".
pub const USER_REJECTED_REQUEST: i64 = 4001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderRequestError {
    #[error("user rejected the request")]
    UserRejected,
    #[error("{0}")]
    Fault(String),
}

impl ProviderRequestError {
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        if code == USER_REJECTED_REQUEST {
            Self::UserRejected
        } else {
            Self::Fault(message.into())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountsEvent {
    AccountsChanged(Vec<String>),
}

/// A wallet object injected into the host (browser extension style).
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    /// Prompts the user for account access and returns the approved accounts.
    async fn request_accounts(&self) -> Result<Vec<String>, ProviderRequestError>;
    /// Latest balance of `address` as a hex quantity in base units.
    async fn get_balance(&self, address: &str) -> Result<String, ProviderRequestError>;
    fn exposes_balance(&self) -> bool {
        true
    }
    fn subscribe_accounts(&self) -> broadcast::Receiver<AccountsEvent>;
}

/// Ambient environment that may or may not carry injected wallet objects.
pub trait HostEnvironment: Send + Sync {
    fn injected_provider(&self, kind: ProviderKind) -> Option<Arc<dyn InjectedProvider>>;
}

pub struct EmptyHost;

impl HostEnvironment for EmptyHost {
    fn injected_provider(&self, _kind: ProviderKind) -> Option<Arc<dyn InjectedProvider>> {
        None
    }
}
