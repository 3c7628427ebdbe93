//! Debounced DOM mutation watching
//!
//! This crate provides:
//! - `Watcher`: registers target selectors and one callback, and fires the
//!   callback once per burst of changes (150ms quiet period by default)
//! - `Debouncer`: the retriggerable timer behind it
//! - `TokioScheduler`: timers on a tokio local task set (feature `tokio`)
//!
//! The host document is injected through [`domwatch_core::Host`].

pub mod controller;
pub mod debounce;
#[cfg(feature = "tokio")]
pub mod timer;

pub use controller::{WatchOptions, Watcher, WatcherState};
pub use debounce::Debouncer;
#[cfg(feature = "tokio")]
pub use timer::TokioScheduler;

// Re-exports
pub use domwatch_core::{
    DomwatchError, Host, ObserveOptions, ReadyState, Result, Scheduler, Value, WatcherConfig,
};
