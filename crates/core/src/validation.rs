//! Callback validation

use crate::error::{DomwatchError, Result};
use crate::value::{Callback, Value};

/// Ensure a candidate callback is invocable
///
/// Returns the very same callback (the `Rc` is moved out, not rewrapped) when
/// `candidate` is a function. Anything else fails with
/// [`DomwatchError::InvalidArgument`]; nothing is coerced.
pub fn validate_callback(candidate: Value) -> Result<Callback> {
    match candidate {
        Value::Function(callback) => Ok(callback),
        other => Err(DomwatchError::InvalidArgument(other.kind().to_string())),
    }
}
