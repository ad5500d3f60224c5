//! Runtime Assembly
//!
//! Wires the orchestrator task to a registry, settings store, and status
//! broadcast, and hands callers a cloneable control handle. The task is
//! spawned on the current tokio runtime and aborted when the runtime value
//! is stopped or dropped.

use crate::orchestrator::OrchestratorTask;
use burrow_core::{
    create_app_event_channel, create_command_channel, AppEventReceiver, BurrowError, Command,
    CommandSender, ConnectionStatus, OrchestratorConfig, Result, SettingsStore, StatusSender,
    TunnelRegistry,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

// ----------------------------------------------------------------------------
// Tunnel Runtime
// ----------------------------------------------------------------------------

/// Owns the spawned orchestrator task and its channels
pub struct TunnelRuntime {
    config: OrchestratorConfig,
    registry: Arc<dyn TunnelRegistry>,
    settings: Arc<dyn SettingsStore>,
    status_sender: StatusSender,
    task: Option<JoinHandle<()>>,
    commands: Option<CommandSender>,
}

impl TunnelRuntime {
    /// `status_sender` is the system-wide status broadcast; the orchestrator
    /// subscribes at start so it only sees events from then on.
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<dyn TunnelRegistry>,
        settings: Arc<dyn SettingsStore>,
        status_sender: StatusSender,
    ) -> Self {
        Self {
            config,
            registry,
            settings,
            status_sender,
            task: None,
            commands: None,
        }
    }

    /// Spawn the orchestrator task and return its control handle plus the
    /// app event stream.
    pub fn start(&mut self) -> Result<(OrchestratorHandle, AppEventReceiver)> {
        if self.task.is_some() {
            return Err(BurrowError::config_error("runtime already started"));
        }
        self.config.validate().map_err(BurrowError::config_error)?;

        let (command_sender, command_receiver) = create_command_channel(&self.config.channels);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(&self.config.channels);
        let (status_watch, status_reader) = watch::channel(ConnectionStatus::Disconnected);
        let status_receiver = self.status_sender.subscribe();

        let has_platform_support = self.registry.platform_support();

        let task = OrchestratorTask::new(
            self.config.clone(),
            self.registry.clone(),
            self.settings.clone(),
            command_receiver,
            command_sender.clone(),
            status_receiver,
            app_event_sender,
            status_watch,
        );
        self.task = Some(tokio::spawn(task.run()));
        self.commands = Some(command_sender.clone());

        info!("tunnel runtime started");
        Ok((
            OrchestratorHandle {
                commands: command_sender,
                status: status_reader,
                has_platform_support,
            },
            app_event_receiver,
        ))
    }

    /// Ask the task to shut down, then abort it
    pub fn stop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.try_send(Command::Shutdown);
        }
        if let Some(task) = self.task.take() {
            task.abort();
            info!("tunnel runtime stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for TunnelRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Orchestrator Handle
// ----------------------------------------------------------------------------

/// Cloneable control surface for the orchestrator task
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: CommandSender,
    status: watch::Receiver<ConnectionStatus>,
    has_platform_support: bool,
}

impl OrchestratorHandle {
    pub async fn start(&self) -> Result<()> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    pub async fn toggle(&self) -> Result<()> {
        self.send(Command::Toggle).await
    }

    /// Registry probe result captured at runtime start
    pub fn has_platform_support(&self) -> bool {
        self.has_platform_support
    }

    /// Latest published connection status
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Wait for the next status change and return the new value
    pub async fn status_changed(&mut self) -> Result<ConnectionStatus> {
        self.status
            .changed()
            .await
            .map_err(|_| BurrowError::channel_error("orchestrator task gone"))?;
        Ok(*self.status.borrow())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|e| BurrowError::channel_error(format!("command channel closed: {e}")))
    }
}
