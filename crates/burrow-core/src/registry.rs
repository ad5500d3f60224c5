//! Configuration Registry Traits
//!
//! Defines the interface to the external system API that owns tunnel
//! configuration records. Concrete implementations live elsewhere: a
//! platform binding in the application shell, and `StubRegistry` in
//! `burrow-runtime::stub` for tests and demos.
//!
//! ## Contract
//!
//! Every method is asynchronous and performs no implicit retries. Any error
//! terminates the orchestrator operation that made the call; retry is the
//! caller's explicit decision (re-invoking start()).

use crate::errors::{RegistryError, TunnelControlError};
use crate::types::{HandleId, StatusCode, TunnelDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Tunnel Handle Trait
// ----------------------------------------------------------------------------

/// Handle to one configuration record owned by the external registry.
///
/// The handle combines registry persistence (`save`/`reload`/`remove`) with
/// the low-level session control of the tunnel it describes
/// (`start_tunnel`/`stop_tunnel`/`live_status`). The orchestrator never
/// copies the record out; the registry's state stays canonical.
#[async_trait::async_trait]
pub trait TunnelHandle: Send + Sync {
    /// Stable identity, matched against status broadcast events
    fn id(&self) -> HandleId;

    /// Current descriptor as last fetched from the registry
    fn descriptor(&self) -> TunnelDescriptor;

    /// Persist the given descriptor as this record's new state
    async fn save(&self, descriptor: &TunnelDescriptor) -> Result<(), RegistryError>;

    /// Re-fetch canonical state after a save
    async fn reload(&self) -> Result<(), RegistryError>;

    /// Delete this record from the registry
    async fn remove(&self) -> Result<(), RegistryError>;

    /// Status read synchronously from the session at this instant, as
    /// opposed to the last value delivered by the observer channel
    fn live_status(&self) -> StatusCode;

    /// Start the packet-forwarding process with the given opaque options map
    fn start_tunnel(&self, options: &HashMap<String, String>) -> Result<(), TunnelControlError>;

    /// Ask the session to stop; completion is reported via the status
    /// broadcast, not a return value
    fn stop_tunnel(&self);
}

// ----------------------------------------------------------------------------
// Tunnel Registry Trait
// ----------------------------------------------------------------------------

/// Client for the external system API that stores tunnel configurations
#[async_trait::async_trait]
pub trait TunnelRegistry: Send + Sync {
    /// Load every configuration record system-wide, not only this app's
    async fn load_all(&self) -> Result<Vec<Arc<dyn TunnelHandle>>, RegistryError>;

    /// Create and persist a fresh record, returning its handle
    async fn create(
        &self,
        descriptor: TunnelDescriptor,
    ) -> Result<Arc<dyn TunnelHandle>, RegistryError>;

    /// Whether this platform exposes the VPN subsystem at all
    fn platform_support(&self) -> bool;
}
