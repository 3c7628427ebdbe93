//! Browser host for domwatch
//!
//! On `wasm32` this crate provides:
//! - `WebHost`: `domwatch_core::Host` over `window`/`document`, resolving
//!   `MutationObserver` (or its WebKit/Moz prefixed forms) at runtime
//! - `DomWatch`: the JS-facing class, `new DomWatch({ callback, targets })`
//!   with `start()` and `stop()`
//!
//! Diagnostics go to the browser console through a `tracing` subscriber the
//! crate installs on load.

#![forbid(unsafe_code)]

#[cfg(target_arch = "wasm32")]
mod bindings;
#[cfg(target_arch = "wasm32")]
mod host;
pub mod logging;
mod slots;

#[cfg(target_arch = "wasm32")]
pub use bindings::DomWatch;
#[cfg(target_arch = "wasm32")]
pub use host::WebHost;

use domwatch_core::{MutationKind, ReadyState};

/// Map a `MutationRecord.type` string to its kind
pub fn record_kind(record_type: &str) -> Option<MutationKind> {
    match record_type {
        "childList" => Some(MutationKind::ChildList),
        "attributes" => Some(MutationKind::Attributes),
        "characterData" => Some(MutationKind::CharacterData),
        _ => None,
    }
}

/// Map `document.readyState` to a ready state
pub fn ready_state_from_js(state: &str) -> ReadyState {
    match state {
        "loading" => ReadyState::Loading,
        "interactive" => ReadyState::Interactive,
        _ => ReadyState::Complete,
    }
}

/// Debounce delay requested through the JS options object
///
/// Non-finite, negative or absent values fall back to the default.
pub fn debounce_from_js(ms: Option<f64>) -> std::time::Duration {
    match ms {
        Some(ms) if ms.is_finite() && ms >= 0.0 => std::time::Duration::from_millis(ms as u64),
        _ => std::time::Duration::from_millis(domwatch_core::DEFAULT_DEBOUNCE_MS),
    }
}
