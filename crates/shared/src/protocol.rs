use serde::{Deserialize, Serialize};

use crate::domain::ProviderKind;

/// Commands the presentation layer sends into the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkflowCommand {
    SelectProvider { kind: ProviderKind },
    SubmitAsset { reference: String },
    SetTokenCount { count: i64 },
    ConfirmConfiguration,
    OpenManageDialog,
    CloseManageDialog,
    DisconnectWallet,
}

impl WorkflowCommand {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowCommand::SelectProvider { .. } => "select_provider",
            WorkflowCommand::SubmitAsset { .. } => "submit_asset",
            WorkflowCommand::SetTokenCount { .. } => "set_token_count",
            WorkflowCommand::ConfirmConfiguration => "confirm_configuration",
            WorkflowCommand::OpenManageDialog => "open_manage_dialog",
            WorkflowCommand::CloseManageDialog => "close_manage_dialog",
            WorkflowCommand::DisconnectWallet => "disconnect_wallet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Warn,
    Error,
}

/// A user-facing notice; rendering (toast, banner, log line) is up to the
/// presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    pub life_ms: u64,
}

impl Notification {
    pub const SHORT_LIFE_MS: u64 = 3000;
    pub const LONG_LIFE_MS: u64 = 5000;

    pub fn new(
        severity: Severity,
        summary: impl Into<String>,
        detail: impl Into<String>,
        life_ms: u64,
    ) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: detail.into(),
            life_ms,
        }
    }
}
