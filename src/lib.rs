// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod controller;
pub mod durable;
pub mod export;
pub mod fields;
pub mod gateway;
pub mod logging;
pub mod phase;
pub mod runtime;
pub mod save;
pub mod session;
pub mod summary;
pub mod tally;
