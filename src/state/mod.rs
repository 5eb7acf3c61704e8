mod countdown;
mod item;

pub use countdown::{compute_remaining, parse_timestamp, remaining_between, CountdownState, Urgency};
pub use item::{cart_total, HeldItem};
