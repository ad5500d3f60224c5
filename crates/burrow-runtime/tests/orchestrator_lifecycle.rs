//! End-to-end orchestrator lifecycle tests against the in-memory stub
//! subsystem: start/stop/toggle, idempotent re-start, configuration
//! deduplication, foreign-VPN deferral with debounced resume, and failure
//! surfacing.

use burrow_core::settings::keys;
use burrow_core::{
    AppEventReceiver, ConnectionStatus, OrchestratorConfig, SettingsStore, StatusCode,
    TunnelDescriptor, TunnelHandle, TunnelRegistry,
};
use burrow_runtime::{OrchestratorHandle, StubSubsystem, TunnelRuntime};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct Harness {
    stub: StubSubsystem,
    config: OrchestratorConfig,
    // Held so the spawned task is not aborted mid-test
    _runtime: TunnelRuntime,
    handle: OrchestratorHandle,
    _app_events: AppEventReceiver,
}

fn spawn_harness(stub: StubSubsystem) -> Harness {
    let config = OrchestratorConfig::testing();
    let mut runtime = TunnelRuntime::new(
        config.clone(),
        stub.registry.clone() as Arc<dyn TunnelRegistry>,
        stub.settings.clone() as Arc<dyn SettingsStore>,
        stub.status_sender.clone(),
    );
    let (handle, app_events) = runtime.start().expect("runtime start");
    Harness {
        stub,
        config,
        _runtime: runtime,
        handle,
        _app_events: app_events,
    }
}

fn our_descriptor(config: &OrchestratorConfig) -> TunnelDescriptor {
    TunnelDescriptor::new_enabled(
        &config.provider_id,
        &config.tunnel_label,
        &config.tunnel_address_range,
    )
}

fn foreign_descriptor() -> TunnelDescriptor {
    TunnelDescriptor::new_enabled("com.example.other-vpn", "Other VPN", "0.0.0.0/0")
}

/// Let the orchestrator task drain its channels
async fn settle() {
    sleep(Duration::from_millis(30)).await;
}

async fn wait_for_status(handle: &mut OrchestratorHandle, want: ConnectionStatus) {
    timeout(Duration::from_secs(2), async {
        while handle.connection_status() != want {
            handle.status_changed().await.expect("orchestrator alive");
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "timed out waiting for {want}, stuck at {}",
            handle.connection_status()
        )
    });
}

// ----------------------------------------------------------------------------
// Start
// ----------------------------------------------------------------------------

#[tokio::test]
async fn start_on_empty_registry_creates_saves_and_starts() {
    let stub = StubSubsystem::new();
    stub.settings.set_string(keys::TUNNEL_DEVICE_IP, "10.25.0.2");
    stub.settings.set_string(keys::TUNNEL_FAKE_IP, "10.25.255.254");
    stub.settings.set_string(keys::TUNNEL_SUBNET_MASK, "255.255.0.0");
    let mut h = spawn_harness(stub);

    h.handle.start().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Connecting).await;
    settle().await;

    assert_eq!(h.stub.registry.create_calls(), 1);
    let records = h.stub.registry.handles();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.save_calls(), 1);
    assert_eq!(record.reload_calls(), 1);
    assert_eq!(record.start_calls(), 1);
    assert!(record.descriptor().enabled);

    let options = record.last_start_options().expect("options passed to start");
    assert_eq!(options.get(keys::TUNNEL_DEVICE_IP), Some(&"10.25.0.2".to_string()));
    assert_eq!(options.get(keys::TUNNEL_SUBNET_MASK), Some(&"255.255.0.0".to_string()));

    record.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;
}

#[tokio::test]
async fn second_start_does_not_start_a_second_session() {
    let mut h = spawn_harness(StubSubsystem::new());

    h.handle.start().await.unwrap();
    settle().await;
    let record = h.stub.registry.handles().remove(0);
    record.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;

    h.handle.start().await.unwrap();
    settle().await;

    assert_eq!(record.start_calls(), 1);
    assert_eq!(h.stub.registry.create_calls(), 1);
    assert_eq!(h.handle.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn adopts_existing_active_session_at_startup() {
    let stub = StubSubsystem::new();
    let config = OrchestratorConfig::testing();
    let record = stub.registry.insert(our_descriptor(&config), StatusCode::Connected);
    let mut h = spawn_harness(stub);

    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;
    // Adoption touches nothing on the record
    assert_eq!(record.start_calls(), 0);
    assert_eq!(record.save_calls(), 0);
}

// ----------------------------------------------------------------------------
// Deduplication
// ----------------------------------------------------------------------------

#[tokio::test]
async fn start_collapses_duplicates_onto_the_active_record() {
    let stub = StubSubsystem::new();
    let config = OrchestratorConfig::testing();
    let idle = stub.registry.insert(our_descriptor(&config), StatusCode::Disconnected);
    let active = stub.registry.insert(our_descriptor(&config), StatusCode::Connected);
    let trailing = stub.registry.insert(our_descriptor(&config), StatusCode::Invalid);
    let mut h = spawn_harness(stub);

    h.handle.start().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;
    settle().await;

    assert_eq!(h.stub.registry.create_calls(), 0);
    assert_eq!(h.stub.registry.record_count(), 1);
    assert_eq!(idle.remove_calls(), 1);
    assert_eq!(trailing.remove_calls(), 1);
    assert_eq!(active.remove_calls(), 0);
    // The session that was already up was not restarted
    assert_eq!(active.start_calls(), 0);
}

#[tokio::test]
async fn late_duplicate_is_reconciled_away() {
    let mut h = spawn_harness(StubSubsystem::new());

    h.handle.start().await.unwrap();
    settle().await;
    let ours = h.stub.registry.handles().remove(0);
    ours.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;

    // A duplicate appears (another process racing us) and announces itself
    let duplicate = h.stub.registry.insert(our_descriptor(&h.config), StatusCode::Disconnected);
    duplicate.transition(StatusCode::Disconnected);
    settle().await;

    assert_eq!(duplicate.remove_calls(), 1);
    assert_eq!(h.stub.registry.record_count(), 1);
    // Our connected session survives untouched
    assert_eq!(h.handle.connection_status(), ConnectionStatus::Connected);
    assert_eq!(ours.stop_calls(), 0);
}

// ----------------------------------------------------------------------------
// Stop / Toggle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn stop_without_tracked_configuration_is_a_no_op() {
    let h = spawn_harness(StubSubsystem::new());
    settle().await;
    let loads_after_startup = h.stub.registry.load_calls();

    h.handle.stop().await.unwrap();
    settle().await;

    assert_eq!(h.stub.registry.load_calls(), loads_after_startup);
    assert_eq!(h.handle.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn stop_tears_down_and_clears_the_resume_flag() {
    let mut h = spawn_harness(StubSubsystem::new());

    h.handle.start().await.unwrap();
    settle().await;
    let record = h.stub.registry.handles().remove(0);
    record.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;

    h.stub.settings.set_flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT, true);
    h.handle.stop().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Disconnecting).await;

    assert_eq!(record.stop_calls(), 1);
    assert!(!h.stub.settings.flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT));

    record.transition(StatusCode::Disconnected);
    wait_for_status(&mut h.handle, ConnectionStatus::Disconnected).await;
}

#[tokio::test]
async fn toggle_follows_the_projected_status() {
    let mut h = spawn_harness(StubSubsystem::new());

    h.handle.toggle().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Connecting).await;
    let record = h.stub.registry.handles().remove(0);
    record.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;

    h.handle.toggle().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Disconnecting).await;
    assert_eq!(record.stop_calls(), 1);
}

// ----------------------------------------------------------------------------
// Foreign VPN deferral and resume
// ----------------------------------------------------------------------------

#[tokio::test]
async fn start_defers_to_a_connected_foreign_vpn_then_resumes() {
    let stub = StubSubsystem::new();
    let foreign = stub.registry.insert(foreign_descriptor(), StatusCode::Connected);
    let mut h = spawn_harness(stub);
    settle().await;

    h.handle.start().await.unwrap();
    settle().await;

    // Deferred: the foreign session was asked to stop, nothing of ours exists
    assert_eq!(foreign.stop_calls(), 1);
    assert_eq!(h.stub.registry.create_calls(), 0);
    assert!(h.stub.settings.flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT));

    // Foreign disconnect arms the debounce and clears the persisted flag
    // before the delay elapses
    foreign.transition(StatusCode::Disconnected);
    sleep(Duration::from_millis(10)).await;
    assert!(!h.stub.settings.flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT));
    assert_eq!(h.stub.registry.create_calls(), 0);

    // After the debounce the tunnel comes up exactly once
    sleep(Duration::from_millis(60)).await;
    assert_eq!(h.stub.registry.create_calls(), 1);
    let record = h
        .stub
        .registry
        .handles()
        .into_iter()
        .find(|r| r.descriptor().belongs_to(&h.config.provider_id))
        .expect("our record created on resume");
    assert_eq!(record.start_calls(), 1);
    wait_for_status(&mut h.handle, ConnectionStatus::Connecting).await;
}

#[tokio::test]
async fn user_stop_before_the_debounce_cancels_the_resume() {
    let stub = StubSubsystem::new();
    let foreign = stub.registry.insert(foreign_descriptor(), StatusCode::Connected);
    let h = spawn_harness(stub);
    settle().await;

    h.handle.start().await.unwrap();
    settle().await;
    foreign.transition(StatusCode::Disconnected);
    sleep(Duration::from_millis(5)).await;

    // User changes their mind inside the debounce window
    h.handle.stop().await.unwrap();
    sleep(Duration::from_millis(80)).await;

    assert_eq!(h.stub.registry.create_calls(), 0);
    assert!(!h.stub.settings.flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT));
}

#[tokio::test]
async fn disconnect_without_the_flag_does_not_resume() {
    let stub = StubSubsystem::new();
    let foreign = stub.registry.insert(foreign_descriptor(), StatusCode::Connected);
    let h = spawn_harness(stub);
    settle().await;

    // Foreign VPN drops on its own; we never asked it to
    foreign.transition(StatusCode::Disconnected);
    sleep(Duration::from_millis(80)).await;

    assert_eq!(h.stub.registry.create_calls(), 0);
}

// ----------------------------------------------------------------------------
// Failure surfacing
// ----------------------------------------------------------------------------

#[tokio::test]
async fn registry_load_failure_surfaces_as_error() {
    let mut h = spawn_harness(StubSubsystem::new());
    settle().await;

    h.stub.registry.fail_next_load("registry unavailable");
    h.handle.start().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Error).await;

    // A later start recovers
    h.handle.start().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Connecting).await;
}

#[tokio::test]
async fn session_start_failure_surfaces_as_error() {
    let stub = StubSubsystem::new();
    let config = OrchestratorConfig::testing();
    let record = stub.registry.insert(our_descriptor(&config), StatusCode::Disconnected);
    record.fail_next_start("missing entitlement");
    let mut h = spawn_harness(stub);
    settle().await;

    h.handle.start().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Error).await;
    assert_eq!(record.start_calls(), 1);
}

#[tokio::test]
async fn unsupported_platform_is_reported_and_refuses_start() {
    let stub = StubSubsystem::new();
    stub.registry.set_platform_support(false);
    let mut h = spawn_harness(stub);
    settle().await;

    assert!(!h.handle.has_platform_support());

    h.handle.start().await.unwrap();
    wait_for_status(&mut h.handle, ConnectionStatus::Error).await;
    assert_eq!(h.stub.registry.create_calls(), 0);
}

// ----------------------------------------------------------------------------
// Status projection through the broadcast
// ----------------------------------------------------------------------------

#[tokio::test]
async fn reasserting_projects_to_connecting_and_back() {
    let mut h = spawn_harness(StubSubsystem::new());

    h.handle.start().await.unwrap();
    settle().await;
    let record = h.stub.registry.handles().remove(0);
    record.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;

    record.transition(StatusCode::Reasserting);
    wait_for_status(&mut h.handle, ConnectionStatus::Connecting).await;
    record.transition(StatusCode::Connected);
    wait_for_status(&mut h.handle, ConnectionStatus::Connected).await;
}

#[tokio::test]
async fn unknown_status_codes_project_to_error() {
    let mut h = spawn_harness(StubSubsystem::new());

    h.handle.start().await.unwrap();
    settle().await;
    let record = h.stub.registry.handles().remove(0);
    record.transition(StatusCode::Other(42));
    wait_for_status(&mut h.handle, ConnectionStatus::Error).await;
}
