//! Lookup results handed to render-gating code.

use std::collections::HashMap;

use serde::Serialize;

use crate::permissions::{Capabilities, Capability, normalize};
use crate::policy::is_ceo_only;

/// Per-collection answer (`resolve_for_collection`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionAccess {
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub is_loading: bool,
}

impl CollectionAccess {
    /// Conservative answer while data is pending: nothing is allowed.
    pub fn loading() -> Self {
        Self {
            can_create: false,
            can_read: false,
            can_update: false,
            can_delete: false,
            is_loading: true,
        }
    }

    pub fn resolved(capabilities: Capabilities) -> Self {
        Self {
            can_create: capabilities.create,
            can_read: capabilities.read,
            can_update: capabilities.update,
            can_delete: capabilities.delete,
            is_loading: false,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            create: self.can_create,
            read: self.can_read,
            update: self.can_update,
            delete: self.can_delete,
        }
    }
}

/// Whole-matrix answer (`resolve_all`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    /// Lower-cased collection name → capabilities. Empty for privileged roles.
    pub permissions: HashMap<String, Capabilities>,
    pub is_loading: bool,
    pub is_ceo: bool,
}

impl PermissionSet {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    /// Read access, evaluated in order:
    /// 1. no collection → allowed
    /// 2. privileged role → allowed
    /// 3. `ceo_only` → denied
    /// 4. matrix lookup, default denied
    pub fn can_read(&self, collection: Option<&str>) -> bool {
        self.can(collection, Capability::Read)
    }

    /// Same precedence as [`PermissionSet::can_read`] for any capability.
    pub fn can(&self, collection: Option<&str>, capability: Capability) -> bool {
        let Some(name) = collection.filter(|name| !name.trim().is_empty()) else {
            return true;
        };
        if self.is_ceo {
            return true;
        }
        if is_ceo_only(name) {
            return false;
        }
        self.permissions
            .get(&normalize(name))
            .is_some_and(|caps| caps.allows(capability))
    }
}

/// Route-guard decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// Identity or matrix still loading; render a placeholder.
    Pending,
    Allowed,
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(entries: &[(&str, Capabilities)], is_ceo: bool) -> PermissionSet {
        PermissionSet {
            permissions: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            is_loading: false,
            is_ceo,
        }
    }

    #[test]
    fn precedence_rules() {
        let staff = set(
            &[("billing", Capabilities { read: true, ..Capabilities::NONE }), ("ceo_only", Capabilities::ALL)],
            false,
        );
        assert!(staff.can_read(None));
        assert!(staff.can_read(Some("")));
        assert!(staff.can_read(Some("Billing")));
        assert!(!staff.can_read(Some("ceo_only")));
        assert!(!staff.can_read(Some("radiology")));
        assert!(!staff.can(Some("billing"), Capability::Delete));

        let ceo = set(&[], true);
        assert!(ceo.can_read(Some("ceo_only")));
        assert!(ceo.can(Some("radiology"), Capability::Delete));
    }

    #[test]
    fn loading_denies_everything_gated() {
        let loading = PermissionSet::loading();
        assert!(loading.is_loading);
        assert!(loading.can_read(None));
        assert!(!loading.can_read(Some("patient")));
        assert_eq!(CollectionAccess::loading().capabilities(), Capabilities::NONE);
    }

    fn caps() -> impl Strategy<Value = Capabilities> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(create, read, update, delete)| Capabilities { create, read, update, delete },
        )
    }

    proptest! {
        #[test]
        fn null_collection_is_always_readable(
            entries in prop::collection::hash_map("[a-z_]{1,12}", caps(), 0..8),
            is_ceo in any::<bool>(),
            is_loading in any::<bool>(),
        ) {
            let set = PermissionSet { permissions: entries, is_loading, is_ceo };
            prop_assert!(set.can_read(None));
        }

        #[test]
        fn ceo_only_tracks_privilege(
            entries in prop::collection::hash_map("[a-z_]{1,12}", caps(), 0..8),
            is_ceo in any::<bool>(),
        ) {
            let set = PermissionSet { permissions: entries, is_loading: false, is_ceo };
            prop_assert_eq!(set.can_read(Some("ceo_only")), is_ceo);
        }

        #[test]
        fn lookup_ignores_case(name in "[a-z]{1,12}", granted in caps()) {
            let set = PermissionSet {
                permissions: [(name.clone(), granted)].into_iter().collect(),
                is_loading: false,
                is_ceo: false,
            };
            let upper = name.to_uppercase();
            for capability in Capability::ALL {
                prop_assert_eq!(set.can(Some(upper.as_str()), capability), granted.allows(capability));
            }
        }
    }
}
