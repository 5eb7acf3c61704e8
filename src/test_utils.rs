//! In-memory backend and fixtures shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{ApiError, CartScope, CartSource, RemovalGateway};
use crate::state::HeldItem;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
}

/// Item held from `t0 + added_secs` until `t0 + expires_secs`.
pub fn held_at(id: &str, added_secs: i64, expires_secs: i64) -> HeldItem {
    HeldItem::new(id).with_hold(
        (t0() + chrono::Duration::seconds(added_secs)).to_rfc3339(),
        (t0() + chrono::Duration::seconds(expires_secs)).to_rfc3339(),
    )
}

/// How the fake answers removal requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayReply {
    Success,
    Refused,
    Error,
}

/// Cart held in memory. Successful removals drop the item from the cart,
/// the way the real backend does.
pub struct FakeBackend {
    items: Mutex<Vec<HeldItem>>,
    reply: GatewayReply,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    fetches: AtomicUsize,
    fail_fetch: AtomicBool,
}

impl FakeBackend {
    pub fn new(reply: GatewayReply) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            reply,
            delay: None,
            calls: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
        }
    }

    pub fn with_items(self, items: Vec<HeldItem>) -> Self {
        *self.items.lock().unwrap() = items;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_items(&self, items: Vec<HeldItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Ids passed to `remove_item`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CartSource for FakeBackend {
    async fn fetch_items(&self, scope: &CartScope) -> Result<Vec<HeldItem>, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("cart unavailable".to_string()));
        }

        let items = self.items.lock().unwrap().clone();
        Ok(match scope {
            CartScope::Session(_) => items,
            CartScope::Item(id) => items.into_iter().filter(|i| &i.id == id).collect(),
        })
    }
}

#[async_trait]
impl RemovalGateway for FakeBackend {
    async fn remove_item(&self, item_id: &str) -> Result<bool, ApiError> {
        self.calls.lock().unwrap().push(item_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.reply {
            GatewayReply::Success => {
                self.items.lock().unwrap().retain(|i| i.id != item_id);
                Ok(true)
            }
            GatewayReply::Refused => Ok(false),
            GatewayReply::Error => Err(ApiError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream unavailable".to_string(),
            }),
        }
    }
}
