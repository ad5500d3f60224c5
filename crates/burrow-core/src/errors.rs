//! Error types for the Burrow tunnel orchestrator
//!
//! Registry and tunnel-control failures are terminal for the attempt that
//! triggered them: the orchestrator logs them, sets the displayed status to
//! `Error`, and waits for the caller to re-invoke start(). Removal failures
//! during deduplication are the one non-fatal case.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by the external configuration registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Loading configurations failed: {reason}")]
    Load { reason: String },
    #[error("Saving configuration failed: {reason}")]
    Save { reason: String },
    #[error("Reloading configuration failed: {reason}")]
    Reload { reason: String },
    /// Non-fatal during deduplication: logged, never escalated to `Error`
    #[error("Removing configuration failed: {reason}")]
    Remove { reason: String },
}

/// Failures reported by the low-level tunnel session control
#[derive(Debug, thiserror::Error)]
pub enum TunnelControlError {
    #[error("Starting tunnel session failed: {reason}")]
    StartFailed { reason: String },
    #[error("Platform has no VPN subsystem support")]
    UnsupportedPlatform,
}

// ----------------------------------------------------------------------------
// Top-Level Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Burrow orchestrator
#[derive(Debug, thiserror::Error)]
pub enum BurrowError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Tunnel control error: {0}")]
    TunnelControl(#[from] TunnelControlError),

    /// Channel communication error (internal to the actor architecture)
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl BurrowError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        BurrowError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        BurrowError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a tunnel start failure
    pub fn start_failed<R: Into<String>>(reason: R) -> Self {
        BurrowError::TunnelControl(TunnelControlError::StartFailed {
            reason: reason.into(),
        })
    }
}

impl RegistryError {
    pub fn load<R: Into<String>>(reason: R) -> Self {
        RegistryError::Load { reason: reason.into() }
    }

    pub fn save<R: Into<String>>(reason: R) -> Self {
        RegistryError::Save { reason: reason.into() }
    }

    pub fn reload<R: Into<String>>(reason: R) -> Self {
        RegistryError::Reload { reason: reason.into() }
    }

    pub fn remove<R: Into<String>>(reason: R) -> Self {
        RegistryError::Remove { reason: reason.into() }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, BurrowError>;
pub type BurrowResult<T> = Result<T>;
