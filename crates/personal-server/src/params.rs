//! Parameter merging and operation matching.

use serde_json::{Map, Value};

use personal_server_core::AuthorizationError;

/// Overlay grant parameters on runtime parameters.
///
/// Grant values win on key collision: the grant is the permission
/// boundary and callers cannot weaken it.
pub fn merge_parameters(
    runtime: Option<&Map<String, Value>>,
    grant: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = runtime.cloned().unwrap_or_default();
    for (key, value) in grant {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// A caller-declared operation must equal the granted one.
pub fn check_declared_operation(
    declared: Option<&str>,
    granted: &str,
) -> Result<(), AuthorizationError> {
    match declared {
        Some(requested) if requested != granted => Err(AuthorizationError::OperationMismatch {
            granted: granted.to_string(),
            requested: requested.to_string(),
        }),
        _ => Ok(()),
    }
}
