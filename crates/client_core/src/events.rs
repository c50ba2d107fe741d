//! Outbound workflow events and their user-facing notices.

use serde::Serialize;
use shared::{
    domain::{AssetReference, ProviderKind, TokenConfigurationSnapshot, WalletSession},
    error::{ConnectError, ValidationError},
    protocol::{Notification, Severity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    UserRequested,
    SessionEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WalletConnected(WalletSession),
    WalletFailed(ConnectError),
    ProviderNotImplemented(ProviderKind),
    WalletAccountChanged { address: String },
    AssetAccepted(AssetReference),
    ConfigurationChanged(TokenConfigurationSnapshot),
    ConfigurationRejected(ValidationError),
    ConfigConfirmed(TokenConfigurationSnapshot),
    SimulationProgress(u8),
    SimulationComplete,
    ManageDialogChanged(bool),
    WalletDisconnected { reason: DisconnectReason },
}

impl WorkflowEvent {
    pub fn notification(&self) -> Option<Notification> {
        let notice = match self {
            WorkflowEvent::WalletConnected(session) => Notification::new(
                Severity::Success,
                "Wallet Connected",
                format!(
                    "Connected to {}",
                    session
                        .provider_kind
                        .map(ProviderKind::display_name)
                        .unwrap_or("wallet")
                ),
                Notification::SHORT_LIFE_MS,
            ),
            WorkflowEvent::WalletFailed(err @ ConnectError::ProviderNotFound(_)) => {
                Notification::new(
                    Severity::Error,
                    "Wallet Not Found",
                    err.to_string(),
                    Notification::LONG_LIFE_MS,
                )
            }
            WorkflowEvent::WalletFailed(err) => Notification::new(
                Severity::Error,
                "Connection Failed",
                err.to_string(),
                Notification::LONG_LIFE_MS,
            ),
            WorkflowEvent::ProviderNotImplemented(kind) => Notification::new(
                Severity::Info,
                "Not Implemented",
                format!("{} integration requires additional setup", kind.display_name()),
                Notification::SHORT_LIFE_MS,
            ),
            WorkflowEvent::AssetAccepted(_) => Notification::new(
                Severity::Info,
                "NFT Uploaded",
                "Configure your token distribution",
                Notification::SHORT_LIFE_MS,
            ),
            WorkflowEvent::ConfigurationRejected(err) => Notification::new(
                Severity::Warn,
                "Invalid Configuration",
                err.to_string(),
                Notification::LONG_LIFE_MS,
            ),
            WorkflowEvent::SimulationComplete => Notification::new(
                Severity::Success,
                "Success",
                "NFT Fractionalization Complete",
                Notification::SHORT_LIFE_MS,
            ),
            WorkflowEvent::WalletDisconnected { .. } => Notification::new(
                Severity::Info,
                "Wallet Disconnected",
                "Your wallet has been disconnected",
                Notification::SHORT_LIFE_MS,
            ),
            WorkflowEvent::WalletAccountChanged { .. }
            | WorkflowEvent::ConfigurationChanged(_)
            | WorkflowEvent::ConfigConfirmed(_)
            | WorkflowEvent::SimulationProgress(_)
            | WorkflowEvent::ManageDialogChanged(_) => return None,
        };
        Some(notice)
    }
}
