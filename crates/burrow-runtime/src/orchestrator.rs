//! Tunnel Orchestrator Task
//!
//! Serialized actor that owns all tunnel lifecycle state: the tracked
//! configuration handle, the projected connection status, the resume token,
//! and the scan guard. Every mutation happens on this task; collaborators
//! reach it through the command channel and observe it through the status
//! watch and app event channel.

use crate::dedup;
use burrow_core::settings::keys;
use burrow_core::{
    AppEvent, AppEventSender, BurrowError, Command, CommandReceiver, CommandSender,
    ConnectionOptions, ConnectionStatus, OrchestratorConfig, SettingsStore, StatusEvent,
    StatusReceiver, TunnelDescriptor, TunnelHandle, TunnelRegistry,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Orchestrator Task
// ----------------------------------------------------------------------------

/// The tunnel lifecycle state machine.
///
/// Owned by a single spawned task; `run` consumes it. The command channel
/// feeds user intent (start/stop/toggle), the status receiver feeds the
/// system-wide broadcast, and the resume debounce timer re-enters through
/// `Command::ResumeWakeup` on the same channel so firing stays serialized.
pub struct OrchestratorTask {
    config: OrchestratorConfig,
    registry: Arc<dyn TunnelRegistry>,
    settings: Arc<dyn SettingsStore>,
    command_receiver: CommandReceiver,
    /// Clone handed to the debounce timer task
    command_sender: CommandSender,
    status_receiver: StatusReceiver,
    app_event_sender: AppEventSender,
    status_watch: watch::Sender<ConnectionStatus>,

    /// The single configuration record this orchestrator tracks, if any
    handle: Option<Arc<dyn TunnelHandle>>,
    status: ConnectionStatus,
    platform_supported: bool,
    /// Reentrancy guard for registry scans
    scan_in_flight: bool,
    /// In-memory resume token; a `ResumeWakeup` without it is stale
    resume_armed: bool,
}

impl OrchestratorTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<dyn TunnelRegistry>,
        settings: Arc<dyn SettingsStore>,
        command_receiver: CommandReceiver,
        command_sender: CommandSender,
        status_receiver: StatusReceiver,
        app_event_sender: AppEventSender,
        status_watch: watch::Sender<ConnectionStatus>,
    ) -> Self {
        Self {
            config,
            registry,
            settings,
            command_receiver,
            command_sender,
            status_receiver,
            app_event_sender,
            status_watch,
            handle: None,
            status: ConnectionStatus::Disconnected,
            platform_supported: true,
            scan_in_flight: false,
            resume_armed: false,
        }
    }

    /// Main task loop. Adopts any pre-existing configuration, then processes
    /// commands and status events until shutdown.
    pub async fn run(mut self) {
        info!(provider_id = %self.config.provider_id, "orchestrator task starting");

        self.platform_supported = self.registry.platform_support();
        self.publish_app_event(AppEvent::PlatformSupport { supported: self.platform_supported });
        if !self.platform_supported {
            warn!("tunnel subsystem unavailable on this platform");
        }

        // Adopt whatever the registry already holds before taking commands
        self.reconcile_configurations().await;

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => {
                            info!("orchestrator shutting down");
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }
                event = self.status_receiver.recv() => {
                    match event {
                        Ok(event) => self.handle_status_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "status broadcast lagged, rescanning registry");
                            self.reconcile_configurations().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("status broadcast closed, stopping orchestrator");
                            break;
                        }
                    }
                }
            }
        }

        info!("orchestrator task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, "handling command");
        match command {
            Command::Start => self.handle_start().await,
            Command::Stop => self.handle_stop().await,
            Command::Toggle => self.handle_toggle().await,
            Command::ResumeWakeup => self.handle_resume_wakeup().await,
            Command::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------------
    // Start / Stop / Toggle
    // ------------------------------------------------------------------------

    async fn handle_start(&mut self) {
        if !self.platform_supported {
            error!("start refused, tunnel subsystem unavailable");
            self.set_status(ConnectionStatus::Error);
            return;
        }

        // Resync: a start while the tracked session is already up (or coming
        // up) only re-projects its live state.
        let tracked = self.handle.as_ref().map(|h| ConnectionStatus::project(h.live_status()));
        if let Some(projected) = tracked {
            if projected.is_active() {
                debug!(status = %projected, "start while session active, resyncing");
                self.set_status(projected);
                return;
            }
        }

        match self.defer_to_foreign_vpn().await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "foreign VPN scan failed");
                self.set_status(ConnectionStatus::Error);
                return;
            }
        }

        if let Err(e) = self.initialize_and_start().await {
            error!(error = %e, "tunnel start failed");
            self.set_status(ConnectionStatus::Error);
        }
    }

    /// If another provider's VPN session is active, hand off to it: persist
    /// the resume flag, ask the foreign session to stop, and defer our own
    /// start until its disconnect arrives on the broadcast.
    async fn defer_to_foreign_vpn(&mut self) -> Result<bool, BurrowError> {
        let all = self.registry.load_all().await?;
        let foreign = all.into_iter().find(|h| {
            !h.descriptor().belongs_to(&self.config.provider_id)
                && ConnectionStatus::project(h.live_status()).is_active()
        });
        let Some(foreign) = foreign else {
            return Ok(false);
        };

        info!(foreign_id = %foreign.id(), "foreign VPN active, deferring start until it disconnects");
        self.settings.set_flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT, true);
        foreign.stop_tunnel();
        Ok(true)
    }

    /// Load, dedup, adopt (or create) the configuration record, then bring
    /// the session up with the persisted connection options.
    async fn initialize_and_start(&mut self) -> Result<(), BurrowError> {
        let all = self.registry.load_all().await?;
        let ours: Vec<_> = all
            .into_iter()
            .filter(|h| h.descriptor().belongs_to(&self.config.provider_id))
            .collect();

        let handle = match dedup::partition_survivor(ours) {
            Some((survivor, losers)) => {
                dedup::spawn_removals(losers);
                survivor
            }
            None => {
                info!("no configuration on record, creating one");
                self.registry
                    .create(TunnelDescriptor::new_enabled(
                        &self.config.provider_id,
                        &self.config.tunnel_label,
                        &self.config.tunnel_address_range,
                    ))
                    .await?
            }
        };

        // Survivor's session may already be up from a previous run
        let projected = ConnectionStatus::project(handle.live_status());
        if projected.is_active() {
            info!(handle_id = %handle.id(), status = %projected, "adopting already-active session");
            self.handle = Some(handle);
            self.set_status(projected);
            return Ok(());
        }

        self.handle = Some(handle.clone());
        self.set_status(ConnectionStatus::Connecting);

        let mut descriptor = handle.descriptor();
        descriptor.enabled = true;
        handle.save(&descriptor).await?;
        handle.reload().await?;

        // The reload may reveal a session a racing start already brought up
        if ConnectionStatus::project(handle.live_status()) == ConnectionStatus::Connected {
            info!(handle_id = %handle.id(), "session connected during reload, adopting");
            self.set_status(ConnectionStatus::Connected);
            return Ok(());
        }

        let options = ConnectionOptions::load(self.settings.as_ref());
        handle.start_tunnel(&options.to_map())?;
        Ok(())
    }

    async fn handle_stop(&mut self) {
        // A user stop cancels any pending resume
        self.settings.set_flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT, false);
        self.resume_armed = false;

        let Some(handle) = self.handle.clone() else {
            debug!("stop with no tracked configuration, nothing to do");
            return;
        };
        self.set_status(ConnectionStatus::Disconnecting);
        handle.stop_tunnel();
    }

    async fn handle_toggle(&mut self) {
        if self.status.is_active() {
            self.handle_stop().await;
        } else {
            self.handle_start().await;
        }
    }

    // ------------------------------------------------------------------------
    // Status events and reconciliation
    // ------------------------------------------------------------------------

    async fn handle_status_event(&mut self, event: StatusEvent) {
        let projected = ConnectionStatus::project(event.code);
        debug!(handle_id = %event.handle_id, code = ?event.code, status = %projected, "status event");

        // A disconnect anywhere in the system while the resume flag is set
        // arms the debounce. The persisted flag clears immediately; the
        // in-memory token is what the wakeup consumes.
        if projected == ConnectionStatus::Disconnected
            && self.settings.flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT)
        {
            self.settings.set_flag(keys::SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT, false);
            self.resume_armed = true;
            let sender = self.command_sender.clone();
            let debounce = self.config.resume_debounce;
            info!(debounce = ?debounce, "foreign VPN disconnected, arming resume");
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let _ = sender.send(Command::ResumeWakeup).await;
            });
        }

        let concerns_tracked = self
            .handle
            .as_ref()
            .is_some_and(|handle| handle.id() == event.handle_id);
        if concerns_tracked {
            self.set_status(projected);
        } else {
            // Event for a record we do not track; the registry may have
            // changed underneath us
            self.reconcile_configurations().await;
        }
    }

    /// Rescan the registry and converge on at most one tracked record.
    /// Guarded so an in-progress scan is never re-entered.
    async fn reconcile_configurations(&mut self) {
        if self.scan_in_flight {
            debug!("registry scan already in flight, skipping");
            return;
        }
        self.scan_in_flight = true;
        let result = self.run_scan().await;
        self.scan_in_flight = false;

        if let Err(e) = result {
            error!(error = %e, "registry scan failed");
            self.set_status(ConnectionStatus::Error);
        }
    }

    async fn run_scan(&mut self) -> Result<(), BurrowError> {
        let all = self.registry.load_all().await?;
        let ours: Vec<_> = all
            .into_iter()
            .filter(|h| h.descriptor().belongs_to(&self.config.provider_id))
            .collect();

        match dedup::partition_survivor(ours) {
            None => {
                if self.handle.take().is_some() {
                    info!("tracked configuration disappeared from the registry");
                }
                self.set_status(ConnectionStatus::Disconnected);
            }
            Some((survivor, losers)) => {
                dedup::spawn_removals(losers);
                let projected = ConnectionStatus::project(survivor.live_status());
                self.handle = Some(survivor);
                self.set_status(projected);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Resume after foreign disconnect
    // ------------------------------------------------------------------------

    async fn handle_resume_wakeup(&mut self) {
        if !self.resume_armed {
            debug!("stale resume wakeup, ignoring");
            return;
        }
        self.resume_armed = false;

        // A competing start may already have brought the session up
        if self.status.is_active() {
            debug!("session already active at resume wakeup");
            return;
        }

        info!("resuming tunnel after foreign VPN disconnect");
        if let Err(e) = self.initialize_and_start().await {
            error!(error = %e, "resume start failed");
            self.set_status(ConnectionStatus::Error);
        }
    }

    // ------------------------------------------------------------------------
    // Status publication
    // ------------------------------------------------------------------------

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        debug!(from = %self.status, to = %status, "connection status changed");
        self.status = status;
        let _ = self.status_watch.send(status);
        self.publish_app_event(AppEvent::StatusChanged { status });
    }

    fn publish_app_event(&self, event: AppEvent) {
        if let Err(e) = self.app_event_sender.try_send(event) {
            debug!(error = %e, "app event dropped, no listener draining");
        }
    }
}
