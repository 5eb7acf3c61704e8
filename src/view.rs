use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{ApiError, CartScope, CartSource, RemovalGateway};
use crate::clock::Clock;
use crate::events::{EvictionOutcome, EvictionReason, HoldEvent};
use crate::state::{cart_total, CountdownState, HeldItem, Urgency};
use crate::tracker::{Evictor, HoldTracker, TrackerSettings};

/// One line of the rendered list.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldRow {
    pub item: HeldItem,
    /// None for items without a hold window
    pub countdown: Option<CountdownState>,
}

impl HoldRow {
    /// "Expired", a clock, or nothing for untimed items.
    pub fn label(&self) -> Option<String> {
        self.countdown.map(|c| c.label())
    }

    pub fn urgency(&self) -> Option<Urgency> {
        self.countdown.map(|c| c.urgency())
    }
}

/// A page that shows held items with live countdowns.
///
/// The cart page is scoped to a session, the checkout page to one cart item.
/// Both own one tracker for as long as they are mounted.
pub struct HoldView {
    scope: CartScope,
    source: Arc<dyn CartSource>,
    evictor: Evictor,
    tracker: HoldTracker,
    events: mpsc::UnboundedReceiver<HoldEvent>,
    items: Vec<HeldItem>,
}

impl HoldView {
    pub fn new(
        scope: CartScope,
        source: Arc<dyn CartSource>,
        gateway: Arc<dyn RemovalGateway>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        let (tracker, events) = HoldTracker::new(clock, settings);
        Self {
            scope,
            source,
            evictor: Evictor::new(gateway),
            tracker,
            events,
            items: Vec::new(),
        }
    }

    /// Cart page for a session.
    pub fn cart(
        session_id: impl Into<String>,
        source: Arc<dyn CartSource>,
        gateway: Arc<dyn RemovalGateway>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        Self::new(CartScope::Session(session_id.into()), source, gateway, clock, settings)
    }

    /// Checkout page for a single cart item.
    pub fn checkout(
        item_id: impl Into<String>,
        source: Arc<dyn CartSource>,
        gateway: Arc<dyn RemovalGateway>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        Self::new(CartScope::Item(item_id.into()), source, gateway, clock, settings)
    }

    /// First load. Unlike [`HoldView::refresh`], a failure here is returned.
    pub async fn mount(&mut self) -> Result<(), ApiError> {
        let items = self.source.fetch_items(&self.scope).await?;
        self.show(items);
        Ok(())
    }

    /// Re-fetch the list and restart tracking from it.
    /// Keeps the last list if the fetch fails. Returns whether it succeeded.
    pub async fn refresh(&mut self) -> bool {
        match self.source.fetch_items(&self.scope).await {
            Ok(items) => {
                self.show(items);
                true
            }
            Err(e) => {
                warn!(scope = ?self.scope, error = %e, "Refresh failed, keeping last list");
                false
            }
        }
    }

    fn show(&mut self, items: Vec<HeldItem>) {
        self.tracker.initialize(&items);
        self.items = items;
        debug!(scope = ?self.scope, items = self.items.len(), "Item list updated");
    }

    /// User clicked "remove". Ignored for items not currently listed.
    pub async fn remove_item(&mut self, item_id: &str) -> EvictionOutcome {
        if !self.items.iter().any(|i| i.id == item_id) {
            debug!(item_id = %item_id, "Remove for unlisted item ignored");
            return EvictionOutcome::Skipped;
        }
        self.evict(item_id, EvictionReason::UserRequested).await
    }

    /// Next event from the tracker.
    pub async fn next_event(&mut self) -> Option<HoldEvent> {
        self.events.recv().await
    }

    /// React to a tracker event. Expiry evicts and refreshes.
    pub async fn handle(&mut self, event: HoldEvent) -> Option<EvictionOutcome> {
        match event {
            HoldEvent::Expired { item_id } => {
                Some(self.evict(&item_id, EvictionReason::Expired).await)
            }
            HoldEvent::Countdown { .. } => None,
        }
    }

    async fn evict(&mut self, item_id: &str, reason: EvictionReason) -> EvictionOutcome {
        let outcome = self.evictor.evict(&self.tracker, item_id, reason).await;
        if outcome.needs_refresh() {
            self.refresh().await;
        }
        outcome
    }

    // =========================================================================
    // DISPLAY
    // =========================================================================

    pub fn scope(&self) -> &CartScope {
        &self.scope
    }

    pub fn items(&self) -> &[HeldItem] {
        &self.items
    }

    pub fn tracker(&self) -> &HoldTracker {
        &self.tracker
    }

    /// Items paired with their current countdown.
    pub fn rows(&self) -> Vec<HoldRow> {
        let snapshot = self.tracker.snapshot();
        self.items
            .iter()
            .map(|item| HoldRow {
                item: item.clone(),
                countdown: snapshot.get(&item.id).copied(),
            })
            .collect()
    }

    pub fn total(&self) -> Decimal {
        cart_total(&self.items)
    }

    /// Stop every timer. Dropping the view does the same.
    pub fn unmount(self) {
        self.tracker.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{InstantClock, ManualClock};
    use crate::test_utils::{held_at, t0, FakeBackend, GatewayReply};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn parked() -> TrackerSettings {
        TrackerSettings {
            tick_interval: Duration::from_secs(3600 * 24),
            ..Default::default()
        }
    }

    fn cart_view(
        backend: &Arc<FakeBackend>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> HoldView {
        HoldView::cart("sess", backend.clone(), backend.clone(), clock, settings)
    }

    #[tokio::test]
    async fn test_mount_tracks_held_items() {
        let backend = Arc::new(FakeBackend::new(GatewayReply::Success).with_items(vec![
            held_at("a", 0, 900).with_price(dec!(100), 1, 2),
            HeldItem::new("b").with_price(dec!(50), 1, 1),
        ]));
        let mut view = cart_view(&backend, Arc::new(ManualClock::new(t0())), parked());

        view.mount().await.unwrap();

        assert_eq!(view.items().len(), 2);
        assert_eq!(view.tracker().len(), 1);
        assert_eq!(view.total(), dec!(250));

        let rows = view.rows();
        assert_eq!(rows[0].label().as_deref(), Some("15:00"));
        assert_eq!(rows[0].urgency(), Some(Urgency::Normal));
        assert_eq!(rows[1].label(), None);
    }

    #[tokio::test]
    async fn test_mount_failure_is_returned() {
        let backend = Arc::new(FakeBackend::new(GatewayReply::Success));
        backend.set_fail_fetch(true);
        let mut view = cart_view(&backend, Arc::new(ManualClock::new(t0())), parked());

        assert!(view.mount().await.is_err());
        assert!(view.items().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_scope() {
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Success)
                .with_items(vec![held_at("a", 0, 900), held_at("b", 0, 900)]),
        );
        let mut view = HoldView::checkout(
            "b",
            backend.clone(),
            backend.clone(),
            Arc::new(ManualClock::new(t0())),
            parked(),
        );

        view.mount().await.unwrap();

        assert_eq!(view.scope(), &CartScope::Item("b".to_string()));
        assert_eq!(view.items().len(), 1);
        assert_eq!(view.tracker().tracked_ids(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_user_remove_refreshes() {
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Success)
                .with_items(vec![held_at("a", 0, 900), held_at("b", 0, 900)]),
        );
        let mut view = cart_view(&backend, Arc::new(ManualClock::new(t0())), parked());
        view.mount().await.unwrap();

        let outcome = view.remove_item("a").await;

        assert_eq!(outcome, EvictionOutcome::Removed);
        assert_eq!(backend.fetches(), 2);
        assert_eq!(view.items().len(), 1);
        assert!(!view.tracker().is_tracked("a"));
        assert_eq!(view.tracker().live_timers(), 1);

        // Second click on the same item: no longer listed
        assert_eq!(view.remove_item("a").await, EvictionOutcome::Skipped);
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(backend.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failed_remove_still_refreshes() {
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Error).with_items(vec![held_at("a", 0, 900)]),
        );
        let mut view = cart_view(&backend, Arc::new(ManualClock::new(t0())), parked());
        view.mount().await.unwrap();

        let outcome = view.remove_item("a").await;

        assert_eq!(outcome, EvictionOutcome::Failed);
        assert_eq!(backend.fetches(), 2);
        // Server still has it, so the refresh brings the hold back
        assert_eq!(view.items().len(), 1);
        assert!(view.tracker().is_tracked("a"));
        assert_eq!(view.tracker().live_timers(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_list() {
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Success).with_items(vec![held_at("a", 0, 900)]),
        );
        let mut view = cart_view(&backend, Arc::new(ManualClock::new(t0())), parked());
        view.mount().await.unwrap();

        backend.set_fail_fetch(true);
        assert!(!view.refresh().await);
        assert_eq!(view.items().len(), 1);
        assert!(view.tracker().is_tracked("a"));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_server_changes() {
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Success).with_items(vec![held_at("a", 0, 900)]),
        );
        let mut view = cart_view(&backend, Arc::new(ManualClock::new(t0())), parked());
        view.mount().await.unwrap();

        backend.set_items(vec![held_at("a", 0, 1200), held_at("c", 0, 300)]);
        assert!(view.refresh().await);

        assert_eq!(view.tracker().len(), 2);
        assert_eq!(view.tracker().live_timers(), 2);
        assert_eq!(view.tracker().state("a").unwrap().minutes, 20);
    }

    #[tokio::test]
    async fn test_stale_expiry_after_user_remove_is_noop() {
        let clock = ManualClock::new(t0());
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Success).with_items(vec![held_at("a", 0, 60)]),
        );
        let mut view = cart_view(&backend, Arc::new(clock.clone()), parked());
        view.mount().await.unwrap();

        clock.advance(chrono::Duration::seconds(60));
        view.tracker().tick("a");

        // User removes before the queued expiry event is handled
        assert_eq!(view.remove_item("a").await, EvictionOutcome::Removed);

        let mut outcomes = Vec::new();
        while let Ok(event) = view.events.try_recv() {
            if let Some(outcome) = view.handle(event).await {
                outcomes.push(outcome);
            }
        }

        assert_eq!(outcomes, vec![EvictionOutcome::Skipped]);
        assert_eq!(backend.calls(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_expiry_evicts_every_item() {
        let backend = Arc::new(FakeBackend::new(GatewayReply::Success).with_items(vec![
            held_at("a", 0, 2),
            held_at("b", 0, 2),
            held_at("c", 0, 2),
        ]));
        let clock = InstantClock::starting_at(t0());
        let mut view = cart_view(&backend, Arc::new(clock), TrackerSettings::default());
        view.mount().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let mut outcomes = Vec::new();
        while let Ok(event) = view.events.try_recv() {
            if let Some(outcome) = view.handle(event).await {
                outcomes.push(outcome);
            }
        }

        assert_eq!(outcomes, vec![EvictionOutcome::Removed; 3]);
        let mut calls = backend.calls();
        calls.sort();
        assert_eq!(calls, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert!(view.items().is_empty());
        assert!(view.tracker().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_hold_disappears() {
        let backend = Arc::new(FakeBackend::new(GatewayReply::Success).with_items(vec![
            held_at("soon", 0, 2),
            held_at("later", 0, 900),
        ]));
        let clock = InstantClock::starting_at(t0());
        let mut view = cart_view(&backend, Arc::new(clock), TrackerSettings::default());
        view.mount().await.unwrap();

        loop {
            let event = view.next_event().await.unwrap();
            if event.is_expired() {
                // Shown as expired before the removal goes out
                let row = view.rows().into_iter().find(|r| r.item.id == "soon").unwrap();
                assert_eq!(row.label().as_deref(), Some("Expired"));
            }
            if view.handle(event).await.is_some() {
                break;
            }
        }

        assert_eq!(backend.calls(), vec!["soon".to_string()]);
        assert_eq!(view.items().len(), 1);
        assert_eq!(view.items()[0].id, "later");
        assert!(!view.tracker().is_tracked("soon"));
        assert_eq!(view.tracker().live_timers(), 1);
    }

    /// Counts how often the tracker asks for the time, i.e. how often it ticks
    struct CountingClock {
        inner: InstantClock,
        reads: Arc<AtomicUsize>,
    }

    impl Clock for CountingClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.now()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_stops_timers() {
        let backend = Arc::new(
            FakeBackend::new(GatewayReply::Success)
                .with_items(vec![held_at("a", 0, 900), held_at("b", 0, 3)]),
        );
        let reads = Arc::new(AtomicUsize::new(0));
        let clock = CountingClock {
            inner: InstantClock::starting_at(t0()),
            reads: reads.clone(),
        };
        let mut view = cart_view(&backend, Arc::new(clock), TrackerSettings::default());
        view.mount().await.unwrap();
        assert_eq!(view.tracker().live_timers(), 2);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        view.unmount();
        let reads_at_unmount = reads.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(reads.load(Ordering::SeqCst), reads_at_unmount);
        assert!(backend.calls().is_empty());
    }
}
