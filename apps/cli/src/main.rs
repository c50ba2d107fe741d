use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{ConnectOutcome, WorkflowController, WorkflowEvent, WorkflowSettings};
use shared::{
    domain::ProviderKind,
    protocol::{Severity, WorkflowCommand},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wallet_integration::memory::{MemoryHost, MemoryProvider};

const DEMO_ACCOUNT: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
// 2 native units in base units.
const DEMO_BALANCE_HEX: &str = "0x1bc16d674ec80000";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderArg {
    Primary,
    Secondary,
    Remote,
}

impl ProviderArg {
    fn kind(self) -> ProviderKind {
        match self {
            ProviderArg::Primary => ProviderKind::PrimaryInjected,
            ProviderArg::Secondary => ProviderKind::SecondaryInjected,
            ProviderArg::Remote => ProviderKind::RemoteProtocol,
        }
    }
}

/// Runs the wallet-to-token workflow against an in-memory wallet and prints
/// every workflow event as a JSON line.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, value_enum, default_value_t = ProviderArg::Primary)]
    provider: ProviderArg,
    #[arg(long, default_value = "img-1")]
    asset: String,
    /// Token count to set before confirming (10..=1000).
    #[arg(long)]
    tokens: Option<i64>,
    /// Make the wallet decline the connection prompt.
    #[arg(long)]
    reject: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the effective settings as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = WorkflowSettings::load(args.config.as_deref()).context("load settings")?;
    if args.print_config {
        print!("{}", toml::to_string(&settings)?);
        return Ok(());
    }

    let kind = args.provider.kind();
    let mut provider = MemoryProvider::new(DEMO_ACCOUNT, DEMO_BALANCE_HEX);
    if args.reject {
        provider = provider.rejecting();
    }
    let host = MemoryHost::new().with_provider(kind, Arc::new(provider));
    let completion_budget = completion_budget(&settings);
    let controller = WorkflowController::new(Arc::new(host), settings);
    let printer = spawn_event_printer(controller.subscribe_events());

    let outcome = run_workflow(&controller, &args, completion_budget).await;
    if let Err(err) = &outcome {
        error!("tokenize_cli: workflow stopped error={err:#}");
    }

    println!("{}", serde_json::to_string(&controller.snapshot().await)?);
    controller
        .dispatch(WorkflowCommand::DisconnectWallet)
        .await
        .context("disconnect wallet")?;

    // Background tasks only hold weak references, so this closes the event stream.
    drop(controller);
    if let Err(err) = printer.await {
        warn!("tokenize_cli: event printer ended abnormally error={err}");
    }
    outcome
}

async fn run_workflow(
    controller: &Arc<WorkflowController>,
    args: &Args,
    completion_budget: Duration,
) -> Result<()> {
    let mut events = controller.subscribe_events();

    match controller.select_provider(args.provider.kind()).await {
        Ok(ConnectOutcome::Connected(session)) => {
            info!(
                "tokenize_cli: connected address={} balance={}",
                session.short_address(),
                session.balance_native
            );
        }
        Ok(other) => {
            info!("tokenize_cli: wallet not connected outcome={other:?}");
            return Ok(());
        }
        Err(err) => {
            warn!("tokenize_cli: wallet connection failed error={err}");
            return Ok(());
        }
    }

    controller
        .dispatch(WorkflowCommand::SubmitAsset {
            reference: args.asset.clone(),
        })
        .await
        .context("submit asset")?;

    if let Some(count) = args.tokens {
        // A rejected count keeps the previous configuration and is reported as an event.
        if let Err(err) = controller
            .dispatch(WorkflowCommand::SetTokenCount { count })
            .await
        {
            warn!("tokenize_cli: keeping previous token count error={err}");
        }
    }

    controller
        .dispatch(WorkflowCommand::ConfirmConfiguration)
        .await
        .context("confirm configuration")?;

    tokio::time::timeout(completion_budget, wait_for_completion(&mut events))
        .await
        .context("simulation did not complete in time")??;

    controller
        .dispatch(WorkflowCommand::OpenManageDialog)
        .await
        .context("open manage dialog")?;
    controller
        .dispatch(WorkflowCommand::CloseManageDialog)
        .await
        .context("close manage dialog")?;
    Ok(())
}

async fn wait_for_completion(events: &mut broadcast::Receiver<WorkflowEvent>) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(WorkflowEvent::SimulationComplete) => return Ok(()),
            Ok(WorkflowEvent::WalletDisconnected { reason }) => {
                bail!("wallet disconnected during simulation reason={reason:?}")
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => bail!("workflow event stream closed"),
        }
    }
}

fn completion_budget(settings: &WorkflowSettings) -> Duration {
    let ticks = u32::from(100u8.div_ceil(settings.progress_step.max(1))) + 2;
    settings.tick_interval() * ticks + Duration::from_secs(5)
}

fn spawn_event_printer(mut events: broadcast::Receiver<WorkflowEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("tokenize_cli: event printer lagged skipped={skipped}");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("tokenize_cli: failed to encode event error={err}"),
            }

            if let Some(notice) = event.notification() {
                match notice.severity {
                    Severity::Success | Severity::Info => {
                        info!("notice: {} - {}", notice.summary, notice.detail)
                    }
                    Severity::Warn => warn!("notice: {} - {}", notice.summary, notice.detail),
                    Severity::Error => error!("notice: {} - {}", notice.summary, notice.detail),
                }
            }
        }
    })
}
