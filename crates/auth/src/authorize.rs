use thiserror::Error;

use crate::permissions::Capability;
use crate::policy::{RolePolicy, is_ceo_only};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing '{capability}' on '{collection}'")]
    Forbidden {
        collection: String,
        capability: Capability,
    },

    #[error("'{0}' is restricted to privileged roles")]
    Restricted(String),
}

/// Check one capability against a resolved role policy.
///
/// - No IO
/// - No panics
/// - `None`/empty collection names are ungated and always pass
pub fn authorize(
    policy: &RolePolicy,
    collection: Option<&str>,
    required: Capability,
) -> Result<(), AuthzError> {
    if policy.allows(collection, required) {
        return Ok(());
    }

    let collection = collection.unwrap_or_default().trim().to_string();
    if is_ceo_only(&collection) {
        Err(AuthzError::Restricted(collection))
    } else {
        Err(AuthzError::Forbidden {
            collection,
            capability: required,
        })
    }
}
