//! Scenario replay for the `domwatch` command
//!
//! A scenario is a TOML file describing an initial document, a watcher
//! configuration and a sequence of steps. Replaying it reports when the
//! watcher's callback fired.

pub mod replay;
pub mod scenario;

pub use replay::{Clock, Report};
pub use scenario::{ElementSpec, Scenario, Step};
