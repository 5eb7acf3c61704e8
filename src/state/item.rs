use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// One reservation hold on a room-rate combination, as the backend returns it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeldItem {
    /// Cart item id. Join key between server cart state and local countdowns.
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// When the hold was created (ISO datetime)
    #[serde(default)]
    pub added_at: Option<String>,
    /// When the hold lapses (ISO datetime)
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Price per room per night
    #[serde(default)]
    pub price: Decimal,
    #[serde(default = "one")]
    pub rooms: u32,
    #[serde(default = "one")]
    pub nights: u32,
    #[serde(default)]
    pub hotel_name: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

impl HeldItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            added_at: None,
            expires_at: None,
            price: Decimal::ZERO,
            rooms: 1,
            nights: 1,
            hotel_name: None,
            room_name: None,
        }
    }

    /// Set the hold window.
    pub fn with_hold(mut self, added_at: impl Into<String>, expires_at: impl Into<String>) -> Self {
        self.added_at = Some(added_at.into());
        self.expires_at = Some(expires_at.into());
        self
    }

    /// Set price and quantities.
    pub fn with_price(mut self, price: Decimal, rooms: u32, nights: u32) -> Self {
        self.price = price;
        self.rooms = rooms;
        self.nights = nights;
        self
    }

    /// The raw hold window, or None if either end is missing.
    /// Items without a window never enter the countdown system.
    pub fn hold_window(&self) -> Option<(&str, &str)> {
        let added = self.added_at.as_deref().filter(|s| !s.trim().is_empty())?;
        let expires = self.expires_at.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((added, expires))
    }

    pub fn has_hold(&self) -> bool {
        self.hold_window().is_some()
    }

    /// price * rooms * nights
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.rooms) * Decimal::from(self.nights)
    }
}

/// Sum of line totals for display.
pub fn cart_total(items: &[HeldItem]) -> Decimal {
    items.iter().map(HeldItem::line_total).sum()
}
