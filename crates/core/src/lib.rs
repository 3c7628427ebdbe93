//! Core types for domwatch
//!
//! This crate provides:
//! - The host abstraction (`Host`, `Scheduler`, observation handles)
//! - Capability resolution across the three mutation-observer global names
//! - Callback validation over dynamically typed values
//! - Watcher configuration (TOML via serde)
//! - The shared error type

pub mod capability;
pub mod config;
pub mod error;
pub mod host;
pub mod validation;
pub mod value;

// Re-exports
pub use capability::{resolve, Capability, CAPABILITY_NAMES};
pub use config::{WatcherConfig, DEBOUNCE_RANGE_MS, DEFAULT_DEBOUNCE_MS};
pub use error::{DomwatchError, Result};
pub use host::{
    HandleConstructor, Host, ListenerId, MutationCallback, MutationKind, MutationRecord,
    ObservationHandle, ObserveOptions, ReadyState, ReadyListener, Scheduler, Task, TimerId,
};
pub use validation::validate_callback;
pub use value::{Callback, Value};
