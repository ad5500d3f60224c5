//! Burrow CLI - scripted lifecycle demonstrations against the in-memory
//! tunnel subsystem

use anyhow::Context;
use burrow_core::settings::keys;
use burrow_core::{
    AppEvent, AppEventReceiver, ConnectionStatus, OrchestratorConfig, SettingsStore, StatusCode,
    TunnelRegistry,
};
use burrow_runtime::{OrchestratorHandle, StubSubsystem, TunnelRuntime};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Burrow tunnel orchestrator demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the tunnel up, hold it, and tear it down again
    Lifecycle(ScenarioArgs),
    /// Start while a foreign VPN is connected and resume once it disconnects
    Handoff(ScenarioArgs),
}

#[derive(Args)]
struct ScenarioArgs {
    /// Simulated session transition latency in milliseconds
    #[arg(long, default_value_t = 200)]
    latency_ms: u64,

    /// Debounce before resuming after a foreign VPN disconnect, in milliseconds
    #[arg(long, default_value_t = 500)]
    resume_debounce_ms: u64,

    /// Device address handed to the tunnel session
    #[arg(long, default_value = "10.25.0.2")]
    device_ip: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Lifecycle(args) => run_lifecycle(args).await,
        Commands::Handoff(args) => run_handoff(args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

// ----------------------------------------------------------------------------
// Scenario assembly
// ----------------------------------------------------------------------------

struct Demo {
    stub: StubSubsystem,
    runtime: TunnelRuntime,
    handle: OrchestratorHandle,
}

fn assemble(args: &ScenarioArgs) -> anyhow::Result<Demo> {
    let stub = StubSubsystem::new();
    stub.registry
        .set_session_latency(Duration::from_millis(args.latency_ms));
    stub.settings.set_string(keys::TUNNEL_DEVICE_IP, &args.device_ip);
    stub.settings.set_string(keys::TUNNEL_FAKE_IP, "10.25.255.254");
    stub.settings.set_string(keys::TUNNEL_SUBNET_MASK, "255.255.0.0");

    let config = OrchestratorConfig {
        resume_debounce: Duration::from_millis(args.resume_debounce_ms),
        ..OrchestratorConfig::default()
    };

    let mut runtime = TunnelRuntime::new(
        config,
        stub.registry.clone() as Arc<dyn TunnelRegistry>,
        stub.settings.clone() as Arc<dyn SettingsStore>,
        stub.status_sender.clone(),
    );
    let (handle, app_events) = runtime.start().context("starting tunnel runtime")?;
    spawn_event_logger(app_events);

    Ok(Demo { stub, runtime, handle })
}

fn spawn_event_logger(mut app_events: AppEventReceiver) {
    tokio::spawn(async move {
        while let Some(event) = app_events.recv().await {
            match event {
                AppEvent::StatusChanged { status } => info!(%status, "status changed"),
                AppEvent::PlatformSupport { supported } => info!(supported, "platform support"),
            }
        }
    });
}

async fn wait_for(handle: &mut OrchestratorHandle, want: ConnectionStatus) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while handle.connection_status() != want {
            handle.status_changed().await?;
        }
        Ok::<_, burrow_core::BurrowError>(())
    })
    .await
    .with_context(|| format!("timed out waiting for {want}"))??;
    Ok(())
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

async fn run_lifecycle(args: ScenarioArgs) -> anyhow::Result<()> {
    let mut demo = assemble(&args)?;

    info!("starting tunnel");
    demo.handle.start().await?;
    wait_for(&mut demo.handle, ConnectionStatus::Connected).await?;
    info!("tunnel is up, holding briefly");
    tokio::time::sleep(Duration::from_millis(args.latency_ms * 2)).await;

    info!("stopping tunnel");
    demo.handle.stop().await?;
    wait_for(&mut demo.handle, ConnectionStatus::Disconnected).await?;
    info!("tunnel is down");

    demo.runtime.stop();
    Ok(())
}

async fn run_handoff(args: ScenarioArgs) -> anyhow::Result<()> {
    let mut demo = assemble(&args)?;

    // Another provider's VPN is already up when the user asks for ours
    let foreign = demo.stub.registry.insert(
        burrow_core::TunnelDescriptor::new_enabled("com.example.other-vpn", "Other VPN", "0.0.0.0/0"),
        StatusCode::Connected,
    );
    info!(foreign_id = %foreign.handle_id(), "foreign VPN connected, requesting our tunnel");

    demo.handle.start().await?;
    // Deferral hands off: the foreign session winds down, the resume
    // debounce elapses, and our tunnel comes up on its own
    wait_for(&mut demo.handle, ConnectionStatus::Connected).await?;
    info!("tunnel resumed after foreign VPN disconnect");

    demo.handle.stop().await?;
    wait_for(&mut demo.handle, ConnectionStatus::Disconnected).await?;

    demo.runtime.stop();
    Ok(())
}
