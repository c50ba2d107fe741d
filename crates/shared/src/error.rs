use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum ConnectError {
    #[error("{} is not installed. Please install it first.", .0.display_name())]
    ProviderNotFound(ProviderKind),
    #[error("user rejected the connection request")]
    ConnectionRejected,
    #[error("{0}")]
    ProviderError(String),
    #[error("a wallet connection is already in progress")]
    AlreadyConnecting,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("token count {value} is outside the allowed range {min}..={max}")]
    OutOfRange { value: i64, min: u32, max: u32 },
    #[error("unit price must be greater than zero")]
    NonPositivePrice,
    #[error("asset reference must not be empty")]
    EmptyAssetReference,
}
