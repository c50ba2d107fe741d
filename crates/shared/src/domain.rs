use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    PrimaryInjected,
    SecondaryInjected,
    RemoteProtocol,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::PrimaryInjected,
        ProviderKind::SecondaryInjected,
        ProviderKind::RemoteProtocol,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::PrimaryInjected => "MetaMask",
            ProviderKind::SecondaryInjected => "Coinbase Wallet",
            ProviderKind::RemoteProtocol => "WalletConnect",
        }
    }

    /// Injected providers live in the host environment; the remote protocol
    /// is a handshake with nothing to install.
    pub fn is_injected(self) -> bool {
        !matches!(self, ProviderKind::RemoteProtocol)
    }

    pub fn descriptor(self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: self.display_name().to_string(),
            kind: self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceAccuracy {
    #[default]
    Exact,
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletSession {
    pub address: String,
    pub balance_native: Decimal,
    pub provider_kind: Option<ProviderKind>,
    pub connected: bool,
    pub balance_accuracy: BalanceAccuracy,
}

impl WalletSession {
    pub fn connected(
        kind: ProviderKind,
        address: impl Into<String>,
        balance_native: Decimal,
        balance_accuracy: BalanceAccuracy,
    ) -> Self {
        let address = address.into();
        Self {
            connected: !address.is_empty(),
            address,
            balance_native,
            provider_kind: Some(kind),
            balance_accuracy,
        }
    }

    /// Replaces the active address; an empty address is a session end and
    /// collapses back to the disconnected defaults.
    pub fn set_address(&mut self, address: impl Into<String>) {
        let address = address.into();
        if address.is_empty() {
            *self = Self::default();
        } else {
            self.address = address;
        }
    }

    /// `0x1234...abcd` form used by the wallet info bar.
    pub fn short_address(&self) -> String {
        let chars: Vec<char> = self.address.chars().collect();
        if chars.len() <= 10 {
            return self.address.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetReference(String);

impl AssetReference {
    pub fn new(locator: impl Into<String>) -> Result<Self, ValidationError> {
        let locator = locator.into();
        if locator.trim().is_empty() {
            return Err(ValidationError::EmptyAssetReference);
        }
        Ok(Self(locator))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    #[default]
    AwaitingWallet,
    AwaitingAsset,
    Configuring,
    Simulating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    #[default]
    Idle,
    Running,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub progress: u8,
    pub status: SimulationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfigurationSnapshot {
    pub symbol: String,
    pub count: u32,
    pub unit_price: Decimal,
    pub total_value: Decimal,
}
