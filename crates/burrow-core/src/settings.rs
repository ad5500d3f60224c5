//! Persisted Key-Value Settings
//!
//! Interface to the external key-value store holding tunnel addressing and
//! the pending-resume flag. The store is external and synchronous-cheap;
//! anything that can actually block belongs behind the registry traits.

use crate::types::ConnectionOptions;

// ----------------------------------------------------------------------------
// Well-Known Keys
// ----------------------------------------------------------------------------

pub mod keys {
    pub const TUNNEL_DEVICE_IP: &str = "TunnelDeviceIP";
    pub const TUNNEL_FAKE_IP: &str = "TunnelFakeIP";
    pub const TUNNEL_SUBNET_MASK: &str = "TunnelSubnetMask";
    /// True means a foreign VPN was asked to stop so this tunnel could
    /// start; resume once it reports disconnected
    pub const SHOULD_RESUME_AFTER_FOREIGN_DISCONNECT: &str =
        "ShouldResumeAfterForeignDisconnect";
}

// ----------------------------------------------------------------------------
// Settings Store Trait
// ----------------------------------------------------------------------------

/// External key-value storage for connection options and the resume flag
pub trait SettingsStore: Send + Sync {
    fn string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str);
    /// Missing keys read as false
    fn flag(&self, key: &str) -> bool;
    fn set_flag(&self, key: &str, value: bool);
}

impl ConnectionOptions {
    /// Read the current addressing options from the settings store.
    ///
    /// Missing keys fall back to empty strings; the tunnel process is the
    /// one that validates addressing, not the orchestrator.
    pub fn load(store: &dyn SettingsStore) -> Self {
        Self {
            device_ip: store.string(keys::TUNNEL_DEVICE_IP).unwrap_or_default(),
            fake_ip: store.string(keys::TUNNEL_FAKE_IP).unwrap_or_default(),
            subnet_mask: store.string(keys::TUNNEL_SUBNET_MASK).unwrap_or_default(),
        }
    }
}
