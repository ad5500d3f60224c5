//! Orchestrator Configuration
//!
//! Consolidates the tunable values of the orchestrator: this app's provider
//! identity, the resume debounce, and channel buffer sizes.

use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the orchestrator's channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for command channels (UI → Orchestrator)
    pub command_buffer_size: usize,
    /// Buffer size for the status broadcast (Subsystem → Orchestrator)
    pub status_buffer_size: usize,
    /// Buffer size for app event channels (Orchestrator → UI)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 16,  // UI commands are infrequent
            status_buffer_size: 64,   // Subsystem events can be bursty
            app_event_buffer_size: 32,
        }
    }
}

// ----------------------------------------------------------------------------
// Orchestrator Configuration
// ----------------------------------------------------------------------------

/// Configuration for the tunnel orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider identifier unique to this application
    pub provider_id: String,
    /// Descriptive label for newly created configuration records
    pub tunnel_label: String,
    /// Address range the tunnel claims; used for the on-demand rule of a
    /// freshly created configuration
    pub tunnel_address_range: String,
    /// Wait inserted before resuming after a foreign VPN disconnects,
    /// letting the OS finish tearing the foreign tunnel down
    pub resume_debounce: Duration,
    /// Channel buffer sizes
    pub channels: ChannelConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_id: "net.burrow.tunnel-provider".to_string(),
            tunnel_label: "Burrow Tunnel".to_string(),
            tunnel_address_range: "10.25.0.0/16".to_string(),
            resume_debounce: Duration::from_secs(1),
            channels: ChannelConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Configuration for tests: same semantics, millisecond debounce
    pub fn testing() -> Self {
        Self {
            resume_debounce: Duration::from_millis(25),
            ..Self::default()
        }
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_id.is_empty() {
            return Err("provider_id must not be empty".to_string());
        }
        if self.tunnel_label.is_empty() {
            return Err("tunnel_label must not be empty".to_string());
        }
        if self.channels.command_buffer_size == 0
            || self.channels.status_buffer_size == 0
            || self.channels.app_event_buffer_size == 0
        {
            return Err("channel buffer sizes must be non-zero".to_string());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
