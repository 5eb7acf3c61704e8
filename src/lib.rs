pub mod api;
pub mod clock;
pub mod config;
pub mod events;
pub mod logging;
pub mod state;
pub mod tracker;
pub mod view;

#[cfg(test)]
mod test_utils;
