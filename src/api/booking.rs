use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ApiError, CartScope, CartSource, RemovalGateway};
use crate::state::HeldItem;

const CART_PATH: &str = "/cart/get";
const CART_ITEM_PATH: &str = "/cart/item";
const REMOVE_PATH: &str = "/cart/remove";

/// Every backend response is wrapped like this
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn rejection(&self) -> ApiError {
        ApiError::Rejected(
            self.message
                .clone()
                .unwrap_or_else(|| "no message".to_string()),
        )
    }
}

/// Booking backend over form-encoded HTTP POST.
#[derive(Debug, Clone)]
pub struct BookingClient {
    base_url: String,
    client: reqwest::Client,
}

impl BookingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Fetch every item in a session's cart
    pub async fn fetch_cart(&self, session_id: &str) -> Result<Vec<HeldItem>, ApiError> {
        let envelope: Envelope<Vec<HeldItem>> =
            self.post(CART_PATH, &[("session_id", session_id)]).await?;
        if !envelope.success {
            return Err(envelope.rejection());
        }
        Ok(envelope.data.unwrap_or_default())
    }

    /// Fetch a single cart item (checkout)
    pub async fn fetch_cart_item(&self, item_id: &str) -> Result<HeldItem, ApiError> {
        let envelope: Envelope<HeldItem> =
            self.post(CART_ITEM_PATH, &[("cart_item_id", item_id)]).await?;
        if !envelope.success {
            return Err(envelope.rejection());
        }
        envelope.data.ok_or_else(|| {
            ApiError::Rejected(format!("Cart item {} missing from response", item_id))
        })
    }

    /// Ask the backend to drop a held item. Returns its success flag.
    pub async fn remove(&self, item_id: &str) -> Result<bool, ApiError> {
        let envelope: Envelope<serde_json::Value> =
            self.post(REMOVE_PATH, &[("cart_item_id", item_id)]).await?;
        if !envelope.success {
            debug!(item_id = %item_id, message = ?envelope.message, "Removal refused");
        }
        Ok(envelope.success)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.post(&url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl CartSource for BookingClient {
    async fn fetch_items(&self, scope: &CartScope) -> Result<Vec<HeldItem>, ApiError> {
        match scope {
            CartScope::Session(session_id) => self.fetch_cart(session_id).await,
            CartScope::Item(item_id) => Ok(vec![self.fetch_cart_item(item_id).await?]),
        }
    }
}

#[async_trait]
impl RemovalGateway for BookingClient {
    async fn remove_item(&self, item_id: &str) -> Result<bool, ApiError> {
        self.remove(item_id).await
    }
}
