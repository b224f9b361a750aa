//! The backend response envelope.
//!
//! Every payload is JSON with an optional top-level `success` flag. Only an
//! explicit `false` marks a failure; a missing flag means success.

use serde_json::Value;

/// Field names that may carry a refreshed session token, in priority order.
pub const TOKEN_FIELDS: [&str; 4] = ["token", "accessToken", "access_token", "authToken"];

/// Whether the payload explicitly marks itself as failed (`"success": false`).
pub fn is_failure(payload: &Value) -> bool {
    matches!(payload.get("success"), Some(Value::Bool(false)))
}

/// The `data` member of an envelope, or the payload itself when it has none.
pub fn data(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(inner) if !inner.is_null() => inner,
        _ => payload,
    }
}

/// Find a session token in a payload.
///
/// Aliases are checked at the top level first, then inside `data`. Only
/// non-empty strings count.
pub fn extract_token(payload: &Value) -> Option<&str> {
    token_field(payload).or_else(|| payload.get("data").and_then(token_field))
}

fn token_field(object: &Value) -> Option<&str> {
    TOKEN_FIELDS.iter().find_map(|field| {
        object
            .get(*field)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
    })
}
