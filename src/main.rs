use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

use booking_holds::api::BookingClient;
use booking_holds::clock::SystemClock;
use booking_holds::config::Config;
use booking_holds::events::HoldEvent;
use booking_holds::logging;
use booking_holds::view::HoldView;

const NO_SESSION: &str = "No cart session configured (backend.session_id or BOOKING_SESSION_ID)";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load("config.toml")?;
    logging::init(&cfg.general.log_level);
    info!(backend = %cfg.backend.base_url, "Loaded config");

    let session_id = cfg
        .backend
        .session_id
        .clone()
        .ok_or_else(|| anyhow!(NO_SESSION))?;

    let client = Arc::new(BookingClient::new(&cfg.backend.base_url, cfg.request_timeout())?);
    let mut view = HoldView::cart(
        session_id.as_str(),
        client.clone(),
        client,
        Arc::new(SystemClock),
        cfg.tracker_settings(),
    );

    view.mount().await?;
    info!(
        session = %session_id,
        items = view.items().len(),
        held = view.tracker().len(),
        total = %view.total(),
        "Cart loaded"
    );

    if view.tracker().is_empty() {
        info!("No active holds");
        return Ok(());
    }

    // Main event loop
    info!("Watching holds... (Ctrl+C to quit)");
    loop {
        tokio::select! {
            event = view.next_event() => {
                let Some(event) = event else { break };

                if let HoldEvent::Countdown { item_id, state } = &event {
                    info!(
                        item_id = %item_id,
                        remaining = %state.label(),
                        elapsed_pct = state.percentage,
                        urgency = ?state.urgency(),
                        "Hold"
                    );
                }

                if let Some(outcome) = view.handle(event).await {
                    info!(
                        ?outcome,
                        items = view.items().len(),
                        total = %view.total(),
                        "Cart updated"
                    );
                    if view.tracker().is_empty() {
                        info!("All holds released");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    view.unmount();
    Ok(())
}
