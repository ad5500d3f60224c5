//! Channel Communication Protocol Types
//!
//! All inter-task communication flows through these typed channel messages:
//! commands from UI/collaborators into the orchestrator, status events from
//! the external subsystem, and app events back out to observers.

use crate::config::ChannelConfig;
use crate::types::{ConnectionStatus, HandleId, StatusCode};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Command: UI/External → Orchestrator
// ----------------------------------------------------------------------------

/// Commands sent from UI and external collaborators to the orchestrator task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Bring the tunnel up (idempotent while already up or coming up)
    Start,
    /// Tear the tunnel down
    Stop,
    /// Stop when active, start otherwise
    Toggle,
    /// Internal wakeup sent by the resume debounce timer; the orchestrator
    /// re-checks its resume token when this arrives
    ResumeWakeup,
    /// Shut down the orchestrator task gracefully
    Shutdown,
}

// ----------------------------------------------------------------------------
// StatusEvent: Subsystem → Orchestrator
// ----------------------------------------------------------------------------

/// One status-change notification from the system-wide VPN broadcast.
///
/// Delivered on the subsystem's notification context; the orchestrator
/// marshals the resulting state mutation onto its own task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub code: StatusCode,
    /// Which configuration record the event concerns
    pub handle_id: HandleId,
}

// ----------------------------------------------------------------------------
// AppEvent: Orchestrator → UI
// ----------------------------------------------------------------------------

/// State changes pushed from the orchestrator task to UI observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    /// The displayed connection status changed
    StatusChanged { status: ConnectionStatus },
    /// Reported once at startup from the registry's platform probe
    PlatformSupport { supported: bool },
}

// ----------------------------------------------------------------------------
// Channel Type Aliases
// ----------------------------------------------------------------------------

pub type CommandSender = tokio::sync::mpsc::Sender<Command>;
pub type CommandReceiver = tokio::sync::mpsc::Receiver<Command>;
pub type StatusSender = tokio::sync::broadcast::Sender<StatusEvent>;
pub type StatusReceiver = tokio::sync::broadcast::Receiver<StatusEvent>;
pub type AppEventSender = tokio::sync::mpsc::Sender<AppEvent>;
pub type AppEventReceiver = tokio::sync::mpsc::Receiver<AppEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (UI → Orchestrator)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    tokio::sync::mpsc::channel(config.command_buffer_size)
}

/// Create the system-wide status broadcast channel (Subsystem → Orchestrator).
///
/// Returns a sender and one receiver; additional subscribers call
/// `sender.subscribe()`.
pub fn create_status_channel(config: &ChannelConfig) -> (StatusSender, StatusReceiver) {
    tokio::sync::broadcast::channel(config.status_buffer_size)
}

/// Create bounded app event channel (Orchestrator → UI)
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    tokio::sync::mpsc::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
