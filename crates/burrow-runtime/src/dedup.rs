//! Dedup Reconciler
//!
//! Collapses duplicate configuration records sharing this app's provider
//! identifier down to a single survivor. Duplicates are a transient
//! condition: after any reconciliation at most one record remains.

use burrow_core::{ConnectionStatus, TunnelHandle};
use std::sync::Arc;
use tracing::warn;

// ----------------------------------------------------------------------------
// Survivor Selection
// ----------------------------------------------------------------------------

/// Split a set of same-provider records into the survivor and the records
/// to remove.
///
/// The survivor is the first record whose live status projects to Connected
/// or Connecting; if none qualifies, the first record in original order.
/// Returns `None` for an empty set. Sets of one member come back with an
/// empty removal list — no action needed.
pub fn partition_survivor(
    mut matches: Vec<Arc<dyn TunnelHandle>>,
) -> Option<(Arc<dyn TunnelHandle>, Vec<Arc<dyn TunnelHandle>>)> {
    if matches.is_empty() {
        return None;
    }

    let survivor_index = matches
        .iter()
        .position(|handle| ConnectionStatus::project(handle.live_status()).is_active())
        .unwrap_or(0);

    let survivor = matches.remove(survivor_index);
    Some((survivor, matches))
}

// ----------------------------------------------------------------------------
// Best-Effort Removal
// ----------------------------------------------------------------------------

/// Asynchronously remove every non-survivor record.
///
/// Cleanup is best-effort: failures are logged and never escalate the
/// orchestrator's status to Error.
pub fn spawn_removals(losers: Vec<Arc<dyn TunnelHandle>>) {
    for handle in losers {
        tokio::spawn(async move {
            if let Err(e) = handle.remove().await {
                warn!(handle = %handle.id(), "Removing duplicate configuration failed: {}", e);
            }
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
