//! Core domain types for tally: a single active progress tracker, the
//! history of archived trackers, and the export/import dataset codec.

pub mod clock;
pub mod config;
pub mod dataset;
pub mod history;
pub mod state;
pub mod store;
pub mod tracker;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
