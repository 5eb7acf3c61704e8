use crate::state::CountdownState;

// What the tracker tells its owning view. Timers only send, the view decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldEvent {
    // Fresh countdown for one item (once per tick)
    Countdown {
        item_id: String,
        state: CountdownState,
    },

    // The hold lapsed. Sent exactly once per armed item.
    Expired { item_id: String },
}

impl HoldEvent {
    pub fn item_id(&self) -> &str {
        match self {
            HoldEvent::Countdown { item_id, .. } | HoldEvent::Expired { item_id } => item_id,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, HoldEvent::Expired { .. })
    }
}

/// Why an item is being evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    UserRequested,
    Expired,
}

/// Result of one eviction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// Backend confirmed the removal
    Removed,
    /// Backend refused or was unreachable. Local state was still cleared.
    Failed,
    /// Duplicate or stale request, nothing done
    Skipped,
}

impl EvictionOutcome {
    /// Whether the source list should be re-fetched afterwards.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, EvictionOutcome::Skipped)
    }
}
