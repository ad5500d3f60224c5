//! Burrow Core
//!
//! Foundational types and traits for the Burrow tunnel lifecycle
//! orchestrator: the status projection, configuration descriptors, the
//! registry and settings trait seams to the external VPN subsystem, and the
//! typed channel protocol the orchestrator task speaks.
//!
//! The orchestration logic itself lives in `burrow-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod registry;
pub mod settings;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_app_event_channel, create_command_channel, create_status_channel, AppEvent,
    AppEventReceiver, AppEventSender, Command, CommandReceiver, CommandSender, StatusEvent,
    StatusReceiver, StatusSender,
};
pub use config::{ChannelConfig, OrchestratorConfig};
pub use errors::{BurrowError, BurrowResult, RegistryError, Result, TunnelControlError};
pub use registry::{TunnelHandle, TunnelRegistry};
pub use settings::SettingsStore;
pub use types::{
    ConnectionOptions, ConnectionStatus, HandleId, InterfaceType, OnDemandAction, OnDemandRule,
    StatusCode, TunnelDescriptor,
};
