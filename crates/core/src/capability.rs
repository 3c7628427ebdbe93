//! Mutation-observer capability resolution

use crate::host::{HandleConstructor, Host};
use std::rc::Rc;

/// Global names tried, in priority order
pub const CAPABILITY_NAMES: [&str; 3] = [
    "MutationObserver",
    "WebKitMutationObserver",
    "MozMutationObserver",
];

/// A resolved constructor and the global name it was found under
pub struct Capability<E> {
    /// Name the constructor was found under
    pub name: &'static str,
    /// The constructor itself
    pub constructor: Rc<dyn HandleConstructor<E>>,
}

impl<E> Clone for Capability<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            constructor: self.constructor.clone(),
        }
    }
}

impl<E> std::fmt::Debug for Capability<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability").field("name", &self.name).finish()
    }
}

/// Find the host's mutation-observer constructor
///
/// Returns the first of [`CAPABILITY_NAMES`] the host provides, or `None`
/// when it has none of them. Reporting an unsupported environment is the
/// caller's job.
pub fn resolve<H: Host + ?Sized>(host: &H) -> Option<Capability<H::Element>> {
    CAPABILITY_NAMES.iter().find_map(|&name| {
        host.global_constructor(name)
            .map(|constructor| Capability { name, constructor })
    })
}
