mod eviction;

pub use eviction::Evictor;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::clock::Clock;
use crate::events::HoldEvent;
use crate::state::{parse_timestamp, remaining_between, CountdownState, HeldItem};

/// Tracker timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Time between countdown refreshes for one item
    pub tick_interval: Duration,
    /// Nominal hold length for the percentage when a window is degenerate
    pub fallback_window: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            fallback_window: Duration::from_secs(15 * 60),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Countdown still running
    Running(CountdownState),
    /// This tick crossed expiry. Reported once per armed item.
    Expired(CountdownState),
    /// Expiry was already reported, nothing to do
    AlreadyExpired,
    /// Item not tracked (removed, torn down, or never had a window)
    Untracked,
    /// Tick from a timer that has since been replaced
    Stale,
}

/// One tracked hold
struct Entry {
    /// None when the window could not be parsed; such an entry is always expired
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    state: CountdownState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    expiry_reported: bool,
}

impl Entry {
    fn compute(&self, now: DateTime<Utc>, fallback: Duration) -> CountdownState {
        match self.window {
            Some((added, expires)) => remaining_between(added, expires, now, fallback),
            None => CountdownState::expired(),
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    next_generation: u64,
}

impl Entries {
    fn cancel_all(&mut self) {
        for entry in self.map.values_mut() {
            entry.cancel_timer();
        }
        self.map.clear();
    }
}

struct Shared {
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    events: mpsc::UnboundedSender<HoldEvent>,
    entries: Mutex<Entries>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(&self, item_id: &str, generation: Option<u64>) -> TickOutcome {
        let now = self.clock.now();
        let mut entries = self.lock();

        let Some(entry) = entries.map.get_mut(item_id) else {
            return TickOutcome::Untracked;
        };
        if generation.is_some_and(|g| g != entry.generation) {
            return TickOutcome::Stale;
        }
        if entry.expiry_reported {
            return TickOutcome::AlreadyExpired;
        }

        let state = entry.compute(now, self.settings.fallback_window);

        if state.expired {
            entry.expiry_reported = true;
            entry.cancel_timer();
            debug!(item_id = %item_id, "Hold expired");

            // Eviction goes out before the final display update
            let _ = self.events.send(HoldEvent::Expired {
                item_id: item_id.to_string(),
            });
            entry.state = state;
            let _ = self.events.send(HoldEvent::Countdown {
                item_id: item_id.to_string(),
                state,
            });
            return TickOutcome::Expired(state);
        }

        entry.state = state;
        let _ = self.events.send(HoldEvent::Countdown {
            item_id: item_id.to_string(),
            state,
        });
        TickOutcome::Running(state)
    }
}

/// Spawn the per-item timer. It holds only a weak reference, so a dropped
/// tracker never gets ticked.
fn arm(shared: &Arc<Shared>, item_id: String, generation: u64) -> JoinHandle<()> {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let period = shared.settings.tick_interval;
    let start = Instant::now() + period;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let Some(shared) = weak.upgrade() else {
                break;
            };
            if !matches!(shared.tick(&item_id, Some(generation)), TickOutcome::Running(_)) {
                break;
            }
        }
    })
}

/// Owns every live hold countdown for one view.
///
/// One timer per item, keyed by cart item id. Expiry is reported on the
/// event channel returned by [`HoldTracker::new`]; the tracker itself never
/// talks to the backend. Dropping the tracker cancels all timers.
pub struct HoldTracker {
    shared: Arc<Shared>,
}

impl HoldTracker {
    pub fn new(
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<HoldEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            clock,
            settings,
            events: tx,
            entries: Mutex::new(Entries::default()),
        });
        (Self { shared }, rx)
    }

    pub fn settings(&self) -> TrackerSettings {
        self.shared.settings
    }

    /// Replace the tracked set with `items`.
    ///
    /// Every existing timer is cancelled before any new one is armed. Items
    /// without a complete hold window are skipped. Must run inside a tokio
    /// runtime when any item has a window.
    pub fn initialize(&self, items: &[HeldItem]) {
        let now = self.shared.clock.now();
        let fallback = self.shared.settings.fallback_window;
        let mut entries = self.shared.lock();

        entries.cancel_all();

        for item in items {
            let Some((added_at, expires_at)) = item.hold_window() else {
                continue;
            };

            let window = parse_timestamp(added_at).zip(parse_timestamp(expires_at));
            if window.is_none() {
                debug!(item_id = %item.id, "Unreadable hold window, treating as expired");
            }

            entries.next_generation += 1;
            let generation = entries.next_generation;

            let mut entry = Entry {
                window,
                state: CountdownState::expired(),
                generation,
                timer: None,
                expiry_reported: false,
            };
            entry.state = entry.compute(now, fallback);
            entry.timer = Some(arm(&self.shared, item.id.clone(), generation));

            // Duplicate ids in one list: last one wins, earlier timer goes
            if let Some(mut previous) = entries.map.insert(item.id.clone(), entry) {
                previous.cancel_timer();
            }
        }

        debug!(tracked = entries.map.len(), "Hold tracker initialized");
    }

    /// Recompute one item's countdown now. Normally driven by its timer.
    pub fn tick(&self, item_id: &str) -> TickOutcome {
        self.shared.tick(item_id, None)
    }

    /// Stop tracking an item. Does not touch the backend.
    /// Returns false if the item was not tracked.
    pub fn remove(&self, item_id: &str) -> bool {
        let mut entries = self.shared.lock();
        match entries.map.remove(item_id) {
            Some(mut entry) => {
                entry.cancel_timer();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer and forget every item.
    pub fn teardown(&self) {
        let mut entries = self.shared.lock();
        let count = entries.map.len();
        entries.cancel_all();
        if count > 0 {
            debug!(count, "Hold tracker torn down");
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Last computed countdown for an item.
    pub fn state(&self, item_id: &str) -> Option<CountdownState> {
        self.shared.lock().map.get(item_id).map(|e| e.state)
    }

    /// Last computed countdown for every tracked item.
    pub fn snapshot(&self) -> HashMap<String, CountdownState> {
        self.shared
            .lock()
            .map
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect()
    }

    pub fn is_tracked(&self, item_id: &str) -> bool {
        self.shared.lock().map.contains_key(item_id)
    }

    /// Tracked and its expiry has already been reported.
    pub fn is_expired(&self, item_id: &str) -> bool {
        self.shared
            .lock()
            .map
            .get(item_id)
            .is_some_and(|e| e.expiry_reported)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        self.shared.lock().map.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timers armed and not yet finished.
    pub fn live_timers(&self) -> usize {
        self.shared
            .lock()
            .map
            .values()
            .filter(|e| e.timer.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }
}

impl Drop for HoldTracker {
    fn drop(&mut self) {
        self.teardown();
    }
}
