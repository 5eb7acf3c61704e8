use anyhow::{anyhow, Result};
use std::time::Instant;

use booking_holds::api::BookingClient;
use booking_holds::clock::{Clock, SystemClock};
use booking_holds::config::Config;
use booking_holds::state::compute_remaining;

/// Fetch one cart item and print where its hold stands.
///
/// Usage: hold_probe <cart_item_id>   (or HOLD_ITEM_ID in .env)
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let item_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HOLD_ITEM_ID").ok())
        .ok_or_else(|| anyhow!("Usage: hold_probe <cart_item_id>"))?;

    let cfg = Config::load("config.toml")?;
    let client = BookingClient::new(&cfg.backend.base_url, cfg.request_timeout())?;

    let start = Instant::now();
    let item = client.fetch_cart_item(&item_id).await?;
    let fetch_ms = start.elapsed().as_millis();

    println!(
        "Item {} | {} {} | total {}",
        item.id,
        item.hotel_name.as_deref().unwrap_or("-"),
        item.room_name.as_deref().unwrap_or("-"),
        item.line_total()
    );

    match item.hold_window() {
        Some((added_at, expires_at)) => {
            let state = compute_remaining(
                added_at,
                expires_at,
                SystemClock.now(),
                cfg.tracker_settings().fallback_window,
            );
            println!(
                "Hold: {} ({}% elapsed, {:?})",
                state.label(),
                state.percentage,
                state.urgency()
            );
        }
        None => println!("Hold: none"),
    }

    println!("Fetch: {}ms", fetch_ms);

    Ok(())
}
