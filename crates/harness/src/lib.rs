//! Deterministic test host for domwatch
//!
//! This crate provides:
//! - `VirtualHost`: an in-memory document implementing `domwatch_core::Host`
//! - `ManualClock`: timers that only fire when time is advanced
//! - Selector parsing for `tag`, `.class`, `#id` and comma lists
//! - `LogCapture`: collects `tracing` output for assertions

pub mod clock;
pub mod host;
pub mod logs;
pub mod selector;

// Re-exports
pub use clock::ManualClock;
pub use host::{ElementId, VirtualHost};
pub use logs::LogCapture;
pub use selector::SelectorList;
