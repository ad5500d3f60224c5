//! Core types for the Burrow tunnel orchestrator
//!
//! This module defines the data model shared between the orchestrator and the
//! external VPN subsystem: the status projection, tunnel configuration
//! descriptors, and the options map handed to the packet-forwarding process.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Handle Identifier
// ----------------------------------------------------------------------------

/// Stable identity of a configuration record in the external registry.
///
/// Status broadcast events carry a `HandleId` so the orchestrator can tell
/// whether an event concerns the handle it currently owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Generate a fresh handle identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Status Projection
// ----------------------------------------------------------------------------

/// Raw status code reported by the external VPN subsystem.
///
/// The set of known codes mirrors what the OS reports for a tunnel session.
/// Codes the subsystem may add in the future arrive as [`StatusCode::Other`];
/// the projection below must remain total over all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Configuration exists but the session is not valid yet
    Invalid,
    Disconnected,
    Connecting,
    Connected,
    /// Session is re-establishing itself after an interruption
    Reasserting,
    Disconnecting,
    /// Unrecognized code forwarded verbatim from the subsystem
    Other(u32),
}

/// Connection status as displayed to collaborators.
///
/// The authoritative value lives in the external subsystem; this is a local
/// best-effort projection, correctable at any time by an observer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectionStatus {
    /// Project an external status code onto the five displayed states.
    ///
    /// Total over every code: `Reasserting` counts as `Connecting`, unknown
    /// codes degrade to `Error` rather than panicking the state machine.
    pub fn project(code: StatusCode) -> Self {
        match code {
            StatusCode::Invalid | StatusCode::Disconnected => ConnectionStatus::Disconnected,
            StatusCode::Connecting | StatusCode::Reasserting => ConnectionStatus::Connecting,
            StatusCode::Connected => ConnectionStatus::Connected,
            StatusCode::Disconnecting => ConnectionStatus::Disconnecting,
            StatusCode::Other(_) => ConnectionStatus::Error,
        }
    }

    /// Whether the tunnel is up or coming up
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Connecting)
    }
}

impl From<StatusCode> for ConnectionStatus {
    fn from(code: StatusCode) -> Self {
        ConnectionStatus::project(code)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnecting => "Disconnecting",
            ConnectionStatus::Error => "Error",
        };
        write!(f, "{}", name)
    }
}

// ----------------------------------------------------------------------------
// Tunnel Descriptor
// ----------------------------------------------------------------------------

/// Interface classes an on-demand rule can match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceType {
    Any,
    Wifi,
    Cellular,
    Ethernet,
}

/// What the OS should do when an on-demand rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnDemandAction {
    Connect,
    Disconnect,
    Ignore,
}

/// Condition under which the OS auto-activates the tunnel without explicit
/// user action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDemandRule {
    pub action: OnDemandAction,
    pub interface_type: InterfaceType,
    /// Domain-match conditions; empty means "match any destination"
    pub matched_domains: Vec<String>,
}

impl OnDemandRule {
    /// Rule that connects whenever traffic targets the tunnel's own address
    /// range, on any interface
    pub fn connect_for_address_range(range: impl Into<String>) -> Self {
        Self {
            action: OnDemandAction::Connect,
            interface_type: InterfaceType::Any,
            matched_domains: vec![range.into()],
        }
    }
}

/// Persisted configuration record describing this app's tunnel.
///
/// Owned by the external registry. The orchestrator holds only a handle and
/// pushes changed descriptors back through [`crate::registry::TunnelHandle::save`];
/// it never mutates a copy independently of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelDescriptor {
    /// Provider identifier unique to this application
    pub provider_id: String,
    /// Human-readable label shown by the OS
    pub label: String,
    /// Whether the configuration participates in VPN selection
    pub enabled: bool,
    /// On-demand activation rules
    pub on_demand_rules: Vec<OnDemandRule>,
}

impl TunnelDescriptor {
    /// Fresh descriptor for this app's provider, enabled, with an on-demand
    /// rule covering the tunnel's own address range
    pub fn new_enabled(
        provider_id: impl Into<String>,
        label: impl Into<String>,
        address_range: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            label: label.into(),
            enabled: true,
            on_demand_rules: vec![OnDemandRule::connect_for_address_range(address_range)],
        }
    }

    /// Whether this record belongs to the given provider
    pub fn belongs_to(&self, provider_id: &str) -> bool {
        self.provider_id == provider_id
    }
}

// ----------------------------------------------------------------------------
// Connection Options
// ----------------------------------------------------------------------------

/// Addressing options handed to the packet-forwarding process at start time.
///
/// Sourced from the external key-value settings store; the forwarding
/// implementation itself is opaque and only sees the string map produced by
/// [`ConnectionOptions::to_map`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub device_ip: String,
    pub fake_ip: String,
    pub subnet_mask: String,
}

impl ConnectionOptions {
    /// Flatten into the opaque options map consumed by the tunnel process
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(crate::settings::keys::TUNNEL_DEVICE_IP.to_string(), self.device_ip.clone());
        map.insert(crate::settings::keys::TUNNEL_FAKE_IP.to_string(), self.fake_ip.clone());
        map.insert(
            crate::settings::keys::TUNNEL_SUBNET_MASK.to_string(),
            self.subnet_mask.clone(),
        );
        map
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_is_total_over_known_codes() {
        let known = [
            StatusCode::Invalid,
            StatusCode::Disconnected,
            StatusCode::Connecting,
            StatusCode::Connected,
            StatusCode::Reasserting,
            StatusCode::Disconnecting,
        ];
        for code in known {
            // Every known code must land on exactly one of the five states
            let status = ConnectionStatus::project(code);
            assert!(matches!(
                status,
                ConnectionStatus::Disconnected
                    | ConnectionStatus::Connecting
                    | ConnectionStatus::Connected
                    | ConnectionStatus::Disconnecting
                    | ConnectionStatus::Error
            ));
        }
    }

    #[test]
    fn unknown_code_projects_to_error() {
        assert_eq!(
            ConnectionStatus::project(StatusCode::Other(99)),
            ConnectionStatus::Error
        );
    }

    #[test]
    fn reasserting_counts_as_connecting() {
        assert_eq!(
            ConnectionStatus::project(StatusCode::Reasserting),
            ConnectionStatus::Connecting
        );
    }

    #[test]
    fn invalid_counts_as_disconnected() {
        assert_eq!(
            ConnectionStatus::project(StatusCode::Invalid),
            ConnectionStatus::Disconnected
        );
    }

    #[test]
    fn active_statuses() {
        assert!(ConnectionStatus::Connected.is_active());
        assert!(ConnectionStatus::Connecting.is_active());
        assert!(!ConnectionStatus::Disconnecting.is_active());
        assert!(!ConnectionStatus::Error.is_active());
    }

    #[test]
    fn new_enabled_descriptor_has_address_rule() {
        let desc = TunnelDescriptor::new_enabled("net.example.burrow", "Burrow", "10.25.0.0/16");
        assert!(desc.enabled);
        assert!(desc.belongs_to("net.example.burrow"));
        assert_eq!(desc.on_demand_rules.len(), 1);
        let rule = &desc.on_demand_rules[0];
        assert_eq!(rule.action, OnDemandAction::Connect);
        assert_eq!(rule.matched_domains, vec!["10.25.0.0/16".to_string()]);
    }

    #[test]
    fn options_map_carries_all_keys() {
        let options = ConnectionOptions {
            device_ip: "10.25.0.2".to_string(),
            fake_ip: "198.18.0.1".to_string(),
            subnet_mask: "255.255.0.0".to_string(),
        };
        let map = options.to_map();
        assert_eq!(map.get("TunnelDeviceIP"), Some(&"10.25.0.2".to_string()));
        assert_eq!(map.get("TunnelFakeIP"), Some(&"198.18.0.1".to_string()));
        assert_eq!(map.get("TunnelSubnetMask"), Some(&"255.255.0.0".to_string()));
    }

    #[test]
    fn descriptor_serde_roundtrip() {
        let desc = TunnelDescriptor::new_enabled("net.example.burrow", "Burrow", "10.25.0.0/16");
        let json = serde_json::to_string(&desc).unwrap();
        let back: TunnelDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
