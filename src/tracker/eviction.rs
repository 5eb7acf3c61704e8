use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::HoldTracker;
use crate::api::RemovalGateway;
use crate::events::{EvictionOutcome, EvictionReason};

/// Removes held items on the backend and clears them from the tracker.
///
/// Safe to call twice for the same id: the later call is a no-op while the
/// first is in flight, and an expiry-driven call is a no-op once the item is
/// untracked or its countdown is running again. Refreshing the item list
/// afterwards is the caller's job (see [`EvictionOutcome::needs_refresh`]).
pub struct Evictor {
    gateway: Arc<dyn RemovalGateway>,
    in_flight: Mutex<HashSet<String>>,
}

impl Evictor {
    pub fn new(gateway: Arc<dyn RemovalGateway>) -> Self {
        Self {
            gateway,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn evict(
        &self,
        tracker: &HoldTracker,
        item_id: &str,
        reason: EvictionReason,
    ) -> EvictionOutcome {
        // Judged on the current countdown: a refresh re-arms entries but keeps
        // lapsed ones expired, while a server-extended hold is running again
        let lapsed = tracker.state(item_id).is_some_and(|s| s.expired);
        if reason == EvictionReason::Expired && !lapsed {
            debug!(item_id = %item_id, "Expiry for item no longer lapsed, skipping");
            return EvictionOutcome::Skipped;
        }
        if !self.begin(item_id) {
            debug!(item_id = %item_id, "Eviction already in flight, skipping");
            return EvictionOutcome::Skipped;
        }

        let result = self.gateway.remove_item(item_id).await;
        self.finish(item_id);

        // Local timer goes either way; the refresh reconciles with the server
        tracker.remove(item_id);

        match result {
            Ok(true) => {
                info!(item_id = %item_id, ?reason, "Held item removed");
                EvictionOutcome::Removed
            }
            Ok(false) => {
                warn!(item_id = %item_id, ?reason, "Backend refused removal");
                EvictionOutcome::Failed
            }
            Err(e) => {
                warn!(item_id = %item_id, ?reason, error = %e, "Removal request failed");
                EvictionOutcome::Failed
            }
        }
    }

    /// Number of removals currently awaiting the backend.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn begin(&self, item_id: &str) -> bool {
        self.lock().insert(item_id.to_string())
    }

    fn finish(&self, item_id: &str) {
        self.lock().remove(item_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
