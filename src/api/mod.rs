pub mod booking;

use async_trait::async_trait;
use thiserror::Error;

use crate::state::HeldItem;

pub use booking::BookingClient;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Which item list a view is built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartScope {
    /// Whole cart for a session (cart page)
    Session(String),
    /// One cart item (checkout page)
    Item(String),
}

/// Fetches held items with their hold windows.
#[async_trait]
pub trait CartSource: Send + Sync {
    async fn fetch_items(&self, scope: &CartScope) -> Result<Vec<HeldItem>, ApiError>;
}

/// Deletes a held item on the backend.
#[async_trait]
pub trait RemovalGateway: Send + Sync {
    /// `Ok(true)` if the backend reported success.
    async fn remove_item(&self, item_id: &str) -> Result<bool, ApiError>;
}
