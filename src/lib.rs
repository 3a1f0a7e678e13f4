// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod api;
pub mod app;
pub mod commentary;
pub mod config;
pub mod feed;
pub mod protocol;
pub mod tui;
pub mod voice;
