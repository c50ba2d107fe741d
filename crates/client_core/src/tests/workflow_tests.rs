use super::*;

use std::time::Duration;

use shared::domain::SimulationStatus;
use wallet_integration::memory::{MemoryHost, MemoryProvider};

const ADDRESS: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
const TWO_NATIVE_HEX: &str = "0x1bc16d674ec80000";

struct Harness {
    controller: Arc<WorkflowController>,
    provider: Arc<MemoryProvider>,
    events: broadcast::Receiver<WorkflowEvent>,
}

fn harness_with(provider: MemoryProvider) -> Harness {
    let provider = Arc::new(provider);
    let host = MemoryHost::new().with_provider(ProviderKind::PrimaryInjected, provider.clone());
    let controller = WorkflowController::new(Arc::new(host), WorkflowSettings::default());
    let events = controller.subscribe_events();
    Harness {
        controller,
        provider,
        events,
    }
}

fn harness() -> Harness {
    harness_with(MemoryProvider::new(ADDRESS, TWO_NATIVE_HEX))
}

fn drain(events: &mut broadcast::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn wait_for(
    events: &mut broadcast::Receiver<WorkflowEvent>,
    matches: impl Fn(&WorkflowEvent) -> bool,
) -> Vec<WorkflowEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("event before timeout")
            .expect("event");
        let done = matches(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

async fn advance_to(h: &mut Harness, step: WorkflowStep) {
    if step == WorkflowStep::AwaitingWallet {
        return;
    }
    h.controller
        .select_provider(ProviderKind::PrimaryInjected)
        .await
        .expect("connect");
    if step == WorkflowStep::AwaitingAsset {
        return;
    }
    h.controller.submit_asset("img-1").await.expect("asset");
    if step == WorkflowStep::Configuring {
        return;
    }
    h.controller.confirm_configuration().await.expect("confirm");
}

#[tokio::test]
async fn starts_awaiting_wallet_with_empty_state() {
    let h = harness();
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.step, WorkflowStep::AwaitingWallet);
    assert!(!snapshot.manage_dialog_open);
    assert_eq!(snapshot.wallet, WalletSession::default());
    assert!(snapshot.asset.is_none());
    assert!(snapshot.configuration.is_none());
    assert_eq!(snapshot.simulation.status, SimulationStatus::Idle);
    assert_eq!(h.controller.list_providers().len(), 3);
}

#[tokio::test]
async fn successful_connect_advances_to_asset_step() {
    let mut h = harness();
    let outcome = h
        .controller
        .select_provider(ProviderKind::PrimaryInjected)
        .await
        .expect("connect");
    assert!(matches!(outcome, ConnectOutcome::Connected(_)));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingAsset);

    let events = drain(&mut h.events);
    assert!(matches!(
        events.as_slice(),
        [WorkflowEvent::WalletConnected(session)] if session.address == ADDRESS
    ));
    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.wallet.connected);
    assert_eq!(snapshot.wallet.balance_native.to_string(), "2.0000");
}

#[tokio::test]
async fn failed_connect_is_recoverable() {
    let mut h = harness();
    let err = h
        .controller
        .select_provider(ProviderKind::SecondaryInjected)
        .await
        .expect_err("not installed");
    assert!(matches!(
        err,
        WorkflowError::Connect(ConnectError::ProviderNotFound(ProviderKind::SecondaryInjected))
    ));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
    assert_eq!(
        drain(&mut h.events),
        vec![WorkflowEvent::WalletFailed(ConnectError::ProviderNotFound(
            ProviderKind::SecondaryInjected
        ))]
    );

    h.controller
        .select_provider(ProviderKind::PrimaryInjected)
        .await
        .expect("retry succeeds");
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingAsset);
}

#[tokio::test]
async fn rejected_prompt_surfaces_wallet_failed() {
    let mut h = harness_with(MemoryProvider::new(ADDRESS, TWO_NATIVE_HEX).rejecting());
    let err = h
        .controller
        .select_provider(ProviderKind::PrimaryInjected)
        .await
        .expect_err("rejected");
    assert!(matches!(err, WorkflowError::Connect(ConnectError::ConnectionRejected)));
    assert_eq!(
        drain(&mut h.events),
        vec![WorkflowEvent::WalletFailed(ConnectError::ConnectionRejected)]
    );
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
}

#[tokio::test]
async fn remote_protocol_is_visible_but_not_a_failure() {
    let mut h = harness();
    let outcome = h
        .controller
        .select_provider(ProviderKind::RemoteProtocol)
        .await
        .expect("not an error");
    assert_eq!(outcome, ConnectOutcome::NotImplemented(ProviderKind::RemoteProtocol));
    assert_eq!(
        drain(&mut h.events),
        vec![WorkflowEvent::ProviderNotImplemented(ProviderKind::RemoteProtocol)]
    );
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
}

#[tokio::test(start_paused = true)]
async fn concurrent_select_is_rejected_with_already_connecting() {
    let mut h = harness_with(
        MemoryProvider::new(ADDRESS, TWO_NATIVE_HEX).with_approval_delay(Duration::from_secs(2)),
    );
    let (first, second) = tokio::join!(
        h.controller.select_provider(ProviderKind::PrimaryInjected),
        h.controller.select_provider(ProviderKind::PrimaryInjected)
    );
    assert!(matches!(first, Ok(ConnectOutcome::Connected(_))));
    assert!(matches!(
        second,
        Err(WorkflowError::Connect(ConnectError::AlreadyConnecting))
    ));
    let events = drain(&mut h.events);
    assert!(events.contains(&WorkflowEvent::WalletFailed(ConnectError::AlreadyConnecting)));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingAsset);
}

#[tokio::test]
async fn commands_outside_their_step_change_nothing() {
    let h = harness();
    assert!(matches!(
        h.controller.submit_asset("img-1").await,
        Err(WorkflowError::WrongStep {
            command: "submit_asset",
            step: WorkflowStep::AwaitingWallet
        })
    ));
    assert!(matches!(
        h.controller.set_token_count(50).await,
        Err(WorkflowError::WrongStep { .. })
    ));
    assert!(matches!(
        h.controller.confirm_configuration().await,
        Err(WorkflowError::WrongStep { .. })
    ));
    assert!(matches!(
        h.controller.open_manage_dialog().await,
        Err(WorkflowError::WrongStep { .. })
    ));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
}

#[tokio::test]
async fn asset_receipt_creates_default_configuration() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::AwaitingAsset).await;
    drain(&mut h.events);

    assert!(matches!(
        h.controller.submit_asset("   ").await,
        Err(WorkflowError::Validation(ValidationError::EmptyAssetReference))
    ));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingAsset);

    h.controller.submit_asset("img-1").await.expect("asset");
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.step, WorkflowStep::Configuring);
    assert_eq!(snapshot.asset.as_ref().map(AssetReference::as_str), Some("img-1"));
    let config = snapshot.configuration.expect("configuration");
    assert_eq!(config.count, 100);
    assert_eq!(config.unit_price, Decimal::new(5, 3));
    assert_eq!(config.total_value, Decimal::new(5, 1));
    assert!(config.symbol.starts_with("NFT-"));

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], WorkflowEvent::AssetAccepted(asset) if asset.as_str() == "img-1"));
    assert!(matches!(&events[1], WorkflowEvent::ConfigurationChanged(_)));
}

#[tokio::test]
async fn token_count_is_validated_and_value_rederived() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Configuring).await;
    drain(&mut h.events);

    h.controller.set_token_count(400).await.expect("in range");
    assert_eq!(h.controller.total_value().await, Some(Decimal::from(2)));

    let err = h.controller.set_token_count(1001).await.expect_err("too many");
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::OutOfRange { value: 1001, .. })
    ));
    assert_eq!(h.controller.total_value().await, Some(Decimal::from(2)));

    let events = drain(&mut h.events);
    assert!(matches!(&events[0], WorkflowEvent::ConfigurationChanged(c) if c.count == 400));
    assert!(matches!(&events[1], WorkflowEvent::ConfigurationRejected(_)));
}

#[tokio::test(start_paused = true)]
async fn simulation_completes_once_and_unlocks_manage_dialog() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Configuring).await;
    drain(&mut h.events);

    h.controller.confirm_configuration().await.expect("confirm");
    assert_eq!(h.controller.step().await, WorkflowStep::Simulating);
    assert!(matches!(
        h.controller.open_manage_dialog().await,
        Err(WorkflowError::ManageUnavailable)
    ));

    let events = wait_for(&mut h.events, |e| *e == WorkflowEvent::SimulationComplete).await;
    assert!(matches!(events[0], WorkflowEvent::ConfigConfirmed(_)));
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::SimulationProgress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let later = drain(&mut h.events);
    assert!(later.is_empty(), "unexpected events after completion: {later:?}");

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.simulation.progress, 100);
    assert_eq!(snapshot.simulation.status, SimulationStatus::Complete);

    h.controller.open_manage_dialog().await.expect("manage");
    assert!(h.controller.snapshot().await.manage_dialog_open);
    h.controller.close_manage_dialog().await;
    h.controller.close_manage_dialog().await;
    assert_eq!(
        drain(&mut h.events),
        vec![
            WorkflowEvent::ManageDialogChanged(true),
            WorkflowEvent::ManageDialogChanged(false)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_simulation_cancels_ticker() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Simulating).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    drain(&mut h.events);

    assert!(h.controller.disconnect_wallet().await);
    assert_eq!(
        drain(&mut h.events),
        vec![WorkflowEvent::WalletDisconnected {
            reason: DisconnectReason::UserRequested
        }]
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut h.events).is_empty());

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.step, WorkflowStep::AwaitingWallet);
    assert!(snapshot.asset.is_none());
    assert!(snapshot.configuration.is_none());
    assert_eq!(snapshot.simulation.status, SimulationStatus::Idle);
    assert!(!snapshot.wallet.connected);

    assert!(!h.controller.disconnect_wallet().await);
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_resets_from_every_step() {
    for step in [
        WorkflowStep::AwaitingAsset,
        WorkflowStep::Configuring,
        WorkflowStep::Simulating,
    ] {
        let mut h = harness();
        advance_to(&mut h, step).await;
        assert_eq!(h.controller.step().await, step);

        assert!(h.controller.disconnect_wallet().await);
        assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
        assert!(!h.controller.disconnect_wallet().await);

        // The flow can be restarted after a reset.
        advance_to(&mut h, WorkflowStep::Configuring).await;
        assert_eq!(h.controller.step().await, WorkflowStep::Configuring);
        drain(&mut h.events);
    }

    let h = harness();
    assert!(!h.controller.disconnect_wallet().await);
}

#[tokio::test(start_paused = true)]
async fn provider_session_end_resets_workflow() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Simulating).await;
    drain(&mut h.events);

    h.provider.emit_accounts_changed(Vec::new());
    let events = wait_for(&mut h.events, |e| {
        matches!(e, WorkflowEvent::WalletDisconnected { .. })
    })
    .await;
    assert_eq!(
        events.last(),
        Some(&WorkflowEvent::WalletDisconnected {
            reason: DisconnectReason::SessionEnded
        })
    );
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
    assert!(!h.controller.snapshot().await.wallet.connected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, WorkflowEvent::SimulationProgress(_))));
}

#[tokio::test]
async fn account_switch_is_forwarded_without_reset() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Configuring).await;
    drain(&mut h.events);

    h.provider.emit_accounts_changed(vec!["0xfeedbeef".into()]);
    let events = wait_for(&mut h.events, |e| {
        matches!(e, WorkflowEvent::WalletAccountChanged { .. })
    })
    .await;
    assert_eq!(
        events,
        vec![WorkflowEvent::WalletAccountChanged {
            address: "0xfeedbeef".into()
        }]
    );
    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.step, WorkflowStep::Configuring);
    assert_eq!(snapshot.wallet.address, "0xfeedbeef");
}

#[tokio::test(start_paused = true)]
async fn late_connect_after_disconnect_is_ignored() {
    let mut h = harness_with(
        MemoryProvider::new(ADDRESS, TWO_NATIVE_HEX).with_approval_delay(Duration::from_secs(3)),
    );
    let (outcome, disconnected) = tokio::join!(
        h.controller.select_provider(ProviderKind::PrimaryInjected),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.controller.disconnect_wallet().await
        }
    );
    assert!(disconnected);
    assert!(matches!(outcome, Ok(ConnectOutcome::Abandoned)));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
    assert!(!h.controller.snapshot().await.wallet.connected);
    assert!(!drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, WorkflowEvent::WalletConnected(_))));
}

#[tokio::test(start_paused = true)]
async fn dispatch_drives_the_flow_from_wire_commands() {
    let mut h = harness();
    let script = [
        r#"{"type":"select_provider","payload":{"kind":"primary_injected"}}"#,
        r#"{"type":"submit_asset","payload":{"reference":"img-1"}}"#,
        r#"{"type":"set_token_count","payload":{"count":250}}"#,
        r#"{"type":"confirm_configuration"}"#,
    ];
    for raw in script {
        let command: WorkflowCommand = serde_json::from_str(raw).expect("command");
        h.controller.dispatch(command).await.expect("dispatch");
    }
    wait_for(&mut h.events, |e| *e == WorkflowEvent::SimulationComplete).await;

    h.controller
        .dispatch(WorkflowCommand::OpenManageDialog)
        .await
        .expect("manage");
    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.manage_dialog_open);
    assert_eq!(
        snapshot.configuration.map(|c| c.total_value),
        Some(Decimal::new(125, 2))
    );

    h.controller
        .dispatch(WorkflowCommand::DisconnectWallet)
        .await
        .expect("disconnect");
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_controller_stops_its_ticker() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Simulating).await;
    let Harness {
        controller,
        mut events,
        ..
    } = h;
    drain(&mut events);
    drop(controller);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, WorkflowEvent::SimulationComplete)));
}

#[tokio::test(start_paused = true)]
async fn stale_session_end_does_not_disturb_a_new_connect() {
    let mut h = harness_with(
        MemoryProvider::new(ADDRESS, TWO_NATIVE_HEX).with_approval_delay(Duration::from_secs(3)),
    );
    advance_to(&mut h, WorkflowStep::AwaitingAsset).await;
    let stale = h.controller.connector.session_generation().await;
    assert!(h.controller.disconnect_wallet().await);
    drain(&mut h.events);

    let (outcome, ()) = tokio::join!(
        h.controller.select_provider(ProviderKind::PrimaryInjected),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.controller
                .handle_connector_event(ConnectorEvent::SessionEnded { generation: stale })
                .await;
        }
    );

    assert!(matches!(outcome, Ok(ConnectOutcome::Connected(_))));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingAsset);
    let events = drain(&mut h.events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::WalletDisconnected { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::WalletConnected(_))));
}

#[tokio::test(start_paused = true)]
async fn connect_overtaken_by_reset_releases_the_wallet() {
    let mut h = harness_with(
        MemoryProvider::new(ADDRESS, TWO_NATIVE_HEX).with_approval_delay(Duration::from_secs(3)),
    );
    let (outcome, ()) = tokio::join!(
        h.controller.select_provider(ProviderKind::PrimaryInjected),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let current = h.controller.connector.session_generation().await;
            h.controller
                .handle_connector_event(ConnectorEvent::SessionEnded {
                    generation: current,
                })
                .await;
        }
    );

    assert!(matches!(outcome, Ok(ConnectOutcome::Abandoned)));
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingWallet);
    assert_eq!(h.controller.connector.phase().await, ConnectionPhase::Disconnected);
    assert!(!h.controller.snapshot().await.wallet.connected);
    assert!(!drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, WorkflowEvent::WalletConnected(_))));
}

#[tokio::test(start_paused = true)]
async fn repeated_session_end_is_ignored_after_reconnect() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Configuring).await;
    let ended = h.controller.connector.session_generation().await + 1;
    h.provider.emit_accounts_changed(Vec::new());
    wait_for(&mut h.events, |e| {
        matches!(e, WorkflowEvent::WalletDisconnected { .. })
    })
    .await;

    // A second delivery of the same session end is ignored once a new
    // session has been installed.
    advance_to(&mut h, WorkflowStep::AwaitingAsset).await;
    drain(&mut h.events);
    h.controller
        .handle_connector_event(ConnectorEvent::SessionEnded { generation: ended })
        .await;
    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.controller.step().await, WorkflowStep::AwaitingAsset);
}

#[tokio::test(start_paused = true)]
async fn reset_closes_an_open_manage_dialog() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Simulating).await;
    wait_for(&mut h.events, |e| *e == WorkflowEvent::SimulationComplete).await;
    h.controller.open_manage_dialog().await.expect("manage");
    drain(&mut h.events);

    assert!(h.controller.disconnect_wallet().await);
    assert_eq!(
        drain(&mut h.events),
        vec![
            WorkflowEvent::ManageDialogChanged(false),
            WorkflowEvent::WalletDisconnected {
                reason: DisconnectReason::UserRequested
            }
        ]
    );
    assert!(!h.controller.snapshot().await.manage_dialog_open);
}

#[tokio::test(start_paused = true)]
async fn session_end_closes_an_open_manage_dialog() {
    let mut h = harness();
    advance_to(&mut h, WorkflowStep::Simulating).await;
    wait_for(&mut h.events, |e| *e == WorkflowEvent::SimulationComplete).await;
    h.controller.open_manage_dialog().await.expect("manage");
    drain(&mut h.events);

    h.provider.emit_accounts_changed(Vec::new());
    let events = wait_for(&mut h.events, |e| {
        matches!(e, WorkflowEvent::WalletDisconnected { .. })
    })
    .await;
    assert_eq!(
        events,
        vec![
            WorkflowEvent::ManageDialogChanged(false),
            WorkflowEvent::WalletDisconnected {
                reason: DisconnectReason::SessionEnded
            }
        ]
    );
}
