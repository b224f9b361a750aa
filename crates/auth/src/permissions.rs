use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// One of the four operations gated per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Create,
        Capability::Read,
        Capability::Update,
        Capability::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Create => "create",
            Capability::Read => "read",
            Capability::Update => "update",
            Capability::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The CRUD booleans granted on one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        create: false,
        read: false,
        update: false,
        delete: false,
    };

    pub const ALL: Capabilities = Capabilities {
        create: true,
        read: true,
        update: true,
        delete: true,
    };

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Create => self.create,
            Capability::Read => self.read,
            Capability::Update => self.update,
            Capability::Delete => self.delete,
        }
    }
}

/// One row of a role's permission matrix, as served by the backend.
///
/// Missing or `null` booleans mean "not granted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    #[serde(alias = "collection_name", alias = "collection")]
    pub collection_name: String,
    #[serde(default, deserialize_with = "granted")]
    pub create: bool,
    #[serde(default, deserialize_with = "granted")]
    pub read: bool,
    #[serde(default, deserialize_with = "granted")]
    pub update: bool,
    #[serde(default, deserialize_with = "granted")]
    pub delete: bool,
}

impl PermissionEntry {
    pub fn new(collection_name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            collection_name: collection_name.into(),
            create: capabilities.create,
            read: capabilities.read,
            update: capabilities.update,
            delete: capabilities.delete,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            create: self.create,
            read: self.read,
            update: self.update,
            delete: self.delete,
        }
    }
}

fn granted<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// A role's permissions keyed by lower-cased collection name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionMatrix {
    entries: HashMap<String, Capabilities>,
}

impl PermissionMatrix {
    /// Normalise backend rows. When a collection appears twice the later row wins.
    pub fn from_entries(entries: impl IntoIterator<Item = PermissionEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (normalize(&entry.collection_name), entry.capabilities()))
            .collect();
        Self { entries }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, collection: &str) -> Option<Capabilities> {
        self.entries.get(&normalize(collection)).copied()
    }

    /// Lookup defaulting to [`Capabilities::NONE`].
    pub fn capabilities(&self, collection: &str) -> Capabilities {
        self.get(collection).unwrap_or(Capabilities::NONE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Capabilities)> {
        self.entries.iter().map(|(name, caps)| (name.as_str(), *caps))
    }

    pub fn to_map(&self) -> HashMap<String, Capabilities> {
        self.entries.clone()
    }
}

pub(crate) fn normalize(collection: &str) -> String {
    collection.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_defaults_missing_and_null_to_false() {
        let entry: PermissionEntry = serde_json::from_value(json!({
            "collectionName": "billing",
            "read": true,
            "update": null,
        }))
        .unwrap();

        assert_eq!(
            entry.capabilities(),
            Capabilities { create: false, read: true, update: false, delete: false }
        );
    }

    #[test]
    fn entry_accepts_field_aliases() {
        let snake: PermissionEntry =
            serde_json::from_value(json!({ "collection_name": "patient", "create": true })).unwrap();
        let short: PermissionEntry =
            serde_json::from_value(json!({ "collection": "patient", "create": true })).unwrap();
        assert_eq!(snake, short);
    }

    #[test]
    fn matrix_lookup_is_case_insensitive() {
        let matrix = PermissionMatrix::from_entries([PermissionEntry::new(
            "Billing",
            Capabilities { read: true, ..Capabilities::NONE },
        )]);

        assert_eq!(matrix.capabilities("BILLING").read, true);
        assert_eq!(matrix.capabilities("billing").create, false);
        assert_eq!(matrix.get(" billing "), matrix.get("Billing"));
        assert_eq!(matrix.capabilities("pharmacy"), Capabilities::NONE);
    }

    #[test]
    fn later_duplicate_row_wins() {
        let matrix = PermissionMatrix::from_entries([
            PermissionEntry::new("medication", Capabilities::ALL),
            PermissionEntry::new("MEDICATION", Capabilities::NONE),
        ]);
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.capabilities("medication"), Capabilities::NONE);
    }

    #[test]
    fn capabilities_allow_matches_fields() {
        let caps = Capabilities { create: true, read: false, update: true, delete: false };
        let allowed: Vec<_> = Capability::ALL.into_iter().filter(|c| caps.allows(*c)).collect();
        assert_eq!(allowed, vec![Capability::Create, Capability::Update]);
    }
}
