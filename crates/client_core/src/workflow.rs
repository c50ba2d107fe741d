use std::{
    ops::ControlFlow,
    sync::{Arc, Weak},
};

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    domain::{
        AssetReference, ProviderDescriptor, ProviderKind, SimulationSnapshot,
        TokenConfigurationSnapshot, WalletSession, WorkflowStep,
    },
    error::{ConnectError, ValidationError},
    protocol::WorkflowCommand,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use wallet_integration::HostEnvironment;

use crate::{
    configuration::TokenConfiguration,
    events::{DisconnectReason, WorkflowEvent},
    settings::WorkflowSettings,
    simulator::{SimulationRun, TickOutcome, TokenizationSimulator},
    task::TaskGuard,
    wallet_connector::{ConnectOutcome, ConnectionPhase, ConnectorEvent, WalletConnector},
};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{command} is not available while {step:?}")]
    WrongStep {
        command: &'static str,
        step: WorkflowStep,
    },
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("token management opens once tokenization has completed")]
    ManageUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSnapshot {
    pub step: WorkflowStep,
    pub manage_dialog_open: bool,
    pub wallet: WalletSession,
    pub asset: Option<AssetReference>,
    pub configuration: Option<TokenConfigurationSnapshot>,
    pub simulation: SimulationSnapshot,
}

struct ActiveSimulation {
    run: SimulationRun,
    ticker: Option<TaskGuard>,
}

struct WorkflowInner {
    step: WorkflowStep,
    asset: Option<AssetReference>,
    configuration: Option<TokenConfiguration>,
    simulation: Option<ActiveSimulation>,
    manage_dialog_open: bool,
    /// Bumped on every reset so in-flight work can tell it has been overtaken.
    epoch: u64,
}

impl WorkflowInner {
    fn new() -> Self {
        Self {
            step: WorkflowStep::AwaitingWallet,
            asset: None,
            configuration: None,
            simulation: None,
            manage_dialog_open: false,
            epoch: 0,
        }
    }

    fn require(&self, command: &'static str, step: WorkflowStep) -> Result<(), WorkflowError> {
        if self.step != step {
            return Err(WorkflowError::WrongStep {
                command,
                step: self.step,
            });
        }
        Ok(())
    }

    /// Returns whether the manage dialog was open.
    fn reset(&mut self) -> bool {
        self.epoch += 1;
        if let Some(simulation) = self.simulation.take() {
            if let Some(ticker) = simulation.ticker {
                ticker.cancel();
            }
        }
        self.asset = None;
        self.configuration = None;
        self.step = WorkflowStep::AwaitingWallet;
        std::mem::take(&mut self.manage_dialog_open)
    }
}

pub struct WorkflowController {
    connector: Arc<WalletConnector>,
    simulator: TokenizationSimulator,
    settings: WorkflowSettings,
    inner: Mutex<WorkflowInner>,
    events: broadcast::Sender<WorkflowEvent>,
    connector_watch: std::sync::Mutex<Option<TaskGuard>>,
}

impl WorkflowController {
    /// Must be called from within a tokio runtime.
    pub fn new(host: Arc<dyn HostEnvironment>, settings: WorkflowSettings) -> Arc<Self> {
        let connector = WalletConnector::new(host, settings.placeholder_balance);
        let simulator = TokenizationSimulator::new(settings.tick_interval(), settings.progress_step);
        let connector_events = connector.subscribe_events();
        let (events, _) = broadcast::channel(256);
        let controller = Arc::new(Self {
            connector,
            simulator,
            settings,
            inner: Mutex::new(WorkflowInner::new()),
            events,
            connector_watch: std::sync::Mutex::new(None),
        });

        let watch = spawn_connector_watch(Arc::downgrade(&controller), connector_events);
        if let Ok(mut slot) = controller.connector_watch.lock() {
            *slot = Some(watch);
        }
        controller
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.connector.list_providers()
    }

    pub fn is_provider_available(&self, kind: ProviderKind) -> bool {
        self.connector.is_provider_available(kind)
    }

    pub async fn step(&self) -> WorkflowStep {
        self.inner.lock().await.step
    }

    pub async fn total_value(&self) -> Option<Decimal> {
        self.inner
            .lock()
            .await
            .configuration
            .as_ref()
            .map(TokenConfiguration::total_value)
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let wallet = self.connector.session().await;
        let inner = self.inner.lock().await;
        WorkflowSnapshot {
            step: inner.step,
            manage_dialog_open: inner.manage_dialog_open,
            wallet,
            asset: inner.asset.clone(),
            configuration: inner.configuration.as_ref().map(TokenConfiguration::snapshot),
            simulation: inner
                .simulation
                .as_ref()
                .map(|active| active.run.snapshot())
                .unwrap_or_default(),
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }

    pub async fn dispatch(self: &Arc<Self>, command: WorkflowCommand) -> Result<(), WorkflowError> {
        debug!(command = command.name(), "workflow: dispatching command");
        match command {
            WorkflowCommand::SelectProvider { kind } => self.select_provider(kind).await.map(|_| ()),
            WorkflowCommand::SubmitAsset { reference } => self.submit_asset(reference).await,
            WorkflowCommand::SetTokenCount { count } => self.set_token_count(count).await,
            WorkflowCommand::ConfirmConfiguration => self.confirm_configuration().await,
            WorkflowCommand::OpenManageDialog => self.open_manage_dialog().await,
            WorkflowCommand::CloseManageDialog => {
                self.close_manage_dialog().await;
                Ok(())
            }
            WorkflowCommand::DisconnectWallet => {
                self.disconnect_wallet().await;
                Ok(())
            }
        }
    }

    pub async fn select_provider(&self, kind: ProviderKind) -> Result<ConnectOutcome, WorkflowError> {
        let epoch = {
            let inner = self.inner.lock().await;
            inner.require("select_provider", WorkflowStep::AwaitingWallet)?;
            inner.epoch
        };

        let outcome = match self.connector.connect(kind).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.emit(WorkflowEvent::WalletFailed(err.clone()));
                return Err(err.into());
            }
        };

        match &outcome {
            ConnectOutcome::Connected(session) => {
                let mut inner = self.inner.lock().await;
                if inner.epoch != epoch || inner.step != WorkflowStep::AwaitingWallet {
                    drop(inner);
                    debug!("workflow: connect resolved after a reset, releasing the wallet");
                    self.connector.disconnect().await;
                    return Ok(ConnectOutcome::Abandoned);
                }
                inner.step = WorkflowStep::AwaitingAsset;
                drop(inner);
                info!("workflow: wallet connected, awaiting asset");
                self.emit(WorkflowEvent::WalletConnected(session.clone()));
            }
            ConnectOutcome::NotImplemented(kind) => {
                self.emit(WorkflowEvent::ProviderNotImplemented(*kind));
            }
            ConnectOutcome::Abandoned => {
                debug!("workflow: connect abandoned by disconnect");
            }
        }
        Ok(outcome)
    }

    pub async fn submit_asset(&self, reference: impl Into<String>) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        inner.require("submit_asset", WorkflowStep::AwaitingAsset)?;
        let asset = AssetReference::new(reference)?;
        let configuration = TokenConfiguration::create_with(
            &mut rand::thread_rng(),
            &self.settings.symbol_prefix,
            self.settings.default_token_count,
            self.settings.default_unit_price,
        )?;
        let snapshot = configuration.snapshot();

        inner.asset = Some(asset.clone());
        inner.configuration = Some(configuration);
        inner.step = WorkflowStep::Configuring;
        drop(inner);

        info!(
            "workflow: asset accepted symbol={} count={} unit_price={}",
            snapshot.symbol, snapshot.count, snapshot.unit_price
        );
        self.emit(WorkflowEvent::AssetAccepted(asset));
        self.emit(WorkflowEvent::ConfigurationChanged(snapshot));
        Ok(())
    }

    pub async fn set_token_count(&self, count: i64) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        inner.require("set_token_count", WorkflowStep::Configuring)?;
        let Some(configuration) = inner.configuration.as_mut() else {
            return Err(WorkflowError::WrongStep {
                command: "set_token_count",
                step: WorkflowStep::Configuring,
            });
        };
        match configuration.set_count(count) {
            Ok(()) => {
                let snapshot = configuration.snapshot();
                drop(inner);
                self.emit(WorkflowEvent::ConfigurationChanged(snapshot));
                Ok(())
            }
            Err(err) => {
                drop(inner);
                warn!("workflow: rejected token count={count} error={err}");
                self.emit(WorkflowEvent::ConfigurationRejected(err.clone()));
                Err(err.into())
            }
        }
    }

    pub async fn confirm_configuration(self: &Arc<Self>) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        inner.require("confirm_configuration", WorkflowStep::Configuring)?;
        let Some(snapshot) = inner.configuration.as_ref().map(TokenConfiguration::snapshot) else {
            return Err(WorkflowError::WrongStep {
                command: "confirm_configuration",
                step: WorkflowStep::Configuring,
            });
        };

        let run = self.simulator.start();
        let progress = run.progress();
        let ticker = self.spawn_simulation_ticker(inner.epoch);
        inner.simulation = Some(ActiveSimulation {
            run,
            ticker: Some(ticker),
        });
        inner.step = WorkflowStep::Simulating;
        drop(inner);

        info!(
            "workflow: configuration confirmed symbol={} count={} total_value={} tick_ms={}",
            snapshot.symbol,
            snapshot.count,
            snapshot.total_value,
            self.simulator.interval().as_millis()
        );
        self.emit(WorkflowEvent::ConfigConfirmed(snapshot));
        self.emit(WorkflowEvent::SimulationProgress(progress));
        Ok(())
    }

    fn spawn_simulation_ticker(self: &Arc<Self>, epoch: u64) -> TaskGuard {
        let controller: Weak<Self> = Arc::downgrade(self);
        self.simulator.spawn_ticker(move || {
            let controller = controller.clone();
            async move {
                match controller.upgrade() {
                    Some(controller) => controller.advance_simulation(epoch).await,
                    None => ControlFlow::Break(()),
                }
            }
        })
    }

    async fn advance_simulation(&self, epoch: u64) -> ControlFlow<()> {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return ControlFlow::Break(());
        }
        let Some(active) = inner.simulation.as_mut() else {
            return ControlFlow::Break(());
        };

        match active.run.tick() {
            TickOutcome::Advanced(progress) => {
                drop(inner);
                self.emit(WorkflowEvent::SimulationProgress(progress));
                ControlFlow::Continue(())
            }
            TickOutcome::Completed => {
                let progress = active.run.progress();
                if let Some(ticker) = active.ticker.take() {
                    ticker.detach();
                }
                drop(inner);
                info!("workflow: tokenization simulation complete");
                self.emit(WorkflowEvent::SimulationProgress(progress));
                self.emit(WorkflowEvent::SimulationComplete);
                ControlFlow::Break(())
            }
            TickOutcome::AlreadyComplete | TickOutcome::NotRunning => ControlFlow::Break(()),
        }
    }

    pub async fn open_manage_dialog(&self) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().await;
        inner.require("open_manage_dialog", WorkflowStep::Simulating)?;
        let complete = inner
            .simulation
            .as_ref()
            .map(|active| active.run.is_complete())
            .unwrap_or(false);
        if !complete {
            return Err(WorkflowError::ManageUnavailable);
        }
        if !inner.manage_dialog_open {
            inner.manage_dialog_open = true;
            drop(inner);
            self.emit(WorkflowEvent::ManageDialogChanged(true));
        }
        Ok(())
    }

    pub async fn close_manage_dialog(&self) {
        let mut inner = self.inner.lock().await;
        if inner.manage_dialog_open {
            inner.manage_dialog_open = false;
            drop(inner);
            self.emit(WorkflowEvent::ManageDialogChanged(false));
        }
    }

    /// Returns false when there was nothing to tear down.
    pub async fn disconnect_wallet(&self) -> bool {
        let phase = self.connector.phase().await;
        {
            let inner = self.inner.lock().await;
            if inner.step == WorkflowStep::AwaitingWallet && phase == ConnectionPhase::Disconnected {
                debug!("workflow: disconnect with no active wallet is a no-op");
                return false;
            }
        }

        self.connector.disconnect().await;
        let dialog_was_open = self.inner.lock().await.reset();
        info!("workflow: wallet disconnected, workflow reset");
        self.emit_reset(dialog_was_open, DisconnectReason::UserRequested);
        true
    }

    fn emit_reset(&self, dialog_was_open: bool, reason: DisconnectReason) {
        if dialog_was_open {
            self.emit(WorkflowEvent::ManageDialogChanged(false));
        }
        self.emit(WorkflowEvent::WalletDisconnected { reason });
    }

    async fn handle_connector_event(&self, event: ConnectorEvent) {
        match event {
            ConnectorEvent::SessionEnded { generation } => {
                let mut inner = self.inner.lock().await;
                // Any teardown or new session since this event was raised has
                // already moved the generation on.
                if self.connector.session_generation().await != generation {
                    debug!(generation, "workflow: stale session end ignored");
                    return;
                }
                let dialog_was_open = inner.reset();
                drop(inner);
                info!("workflow: wallet session ended by provider, workflow reset");
                self.emit_reset(dialog_was_open, DisconnectReason::SessionEnded);
            }
            ConnectorEvent::AccountChanged { address } => {
                self.emit(WorkflowEvent::WalletAccountChanged { address });
            }
            ConnectorEvent::Connected(_) | ConnectorEvent::Disconnected => {}
        }
    }
}

fn spawn_connector_watch(
    controller: Weak<WorkflowController>,
    mut events: broadcast::Receiver<ConnectorEvent>,
) -> TaskGuard {
    TaskGuard::spawn("connector_watch", async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("workflow: connector events lagged skipped={skipped}");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(controller) = controller.upgrade() else {
                break;
            };
            controller.handle_connector_event(event).await;
        }
    })
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
