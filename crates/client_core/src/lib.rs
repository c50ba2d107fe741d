//! Wallet-to-token workflow: wallet connection, token split configuration and
//! the paced tokenization simulation, sequenced by [`WorkflowController`].

pub mod configuration;
pub mod events;
pub mod settings;
pub mod simulator;
pub mod task;
pub mod wallet_connector;
pub mod workflow;

pub use configuration::TokenConfiguration;
pub use events::{DisconnectReason, WorkflowEvent};
pub use settings::{SettingsError, WorkflowSettings};
pub use simulator::{SimulationRun, TickOutcome, TokenizationSimulator};
pub use wallet_connector::{ConnectOutcome, ConnectionPhase, ConnectorEvent, WalletConnector};
pub use workflow::{WorkflowController, WorkflowError, WorkflowSnapshot};
