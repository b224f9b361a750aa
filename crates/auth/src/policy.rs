//! Role dispatch: which roles bypass the matrix, and how a policy answers.

use serde::{Deserialize, Serialize};

use crate::permissions::{Capabilities, Capability, PermissionMatrix};
use crate::Role;

/// Reserved collection name that only privileged roles may access.
pub const CEO_ONLY: &str = "ceo_only";

/// Role that bypasses the matrix when nothing else is configured.
pub const DEFAULT_PRIVILEGED_ROLE: &str = "ceo";

/// Roles that are granted everything regardless of matrix content.
///
/// Comparison is case-insensitive. Adding a privileged role is a data change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegedRoles(Vec<Role>);

impl PrivilegedRoles {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().filter(|r| !r.is_unknown()).collect())
    }

    /// No role bypasses the matrix.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, role: &Role) -> bool {
        !role.is_unknown() && self.0.iter().any(|r| r.matches(role.as_str()))
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }
}

impl Default for PrivilegedRoles {
    fn default() -> Self {
        Self(vec![Role::new(DEFAULT_PRIVILEGED_ROLE)])
    }
}

impl FromIterator<Role> for PrivilegedRoles {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// How capability questions are answered for the current role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolePolicy {
    /// Privileged role: everything is allowed.
    Unrestricted,
    /// Everything else: the role's matrix decides, unknown means denied.
    MatrixBacked(PermissionMatrix),
}

impl RolePolicy {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, RolePolicy::Unrestricted)
    }

    pub fn matrix(&self) -> Option<&PermissionMatrix> {
        match self {
            RolePolicy::Unrestricted => None,
            RolePolicy::MatrixBacked(matrix) => Some(matrix),
        }
    }

    /// Capabilities on a named collection.
    pub fn capabilities(&self, collection: &str) -> Capabilities {
        match self {
            RolePolicy::Unrestricted => Capabilities::ALL,
            RolePolicy::MatrixBacked(_) if is_ceo_only(collection) => Capabilities::NONE,
            RolePolicy::MatrixBacked(matrix) => matrix.capabilities(collection),
        }
    }

    /// Whether `capability` is allowed. A missing or empty collection name is
    /// an ungated resource and always allowed.
    pub fn allows(&self, collection: Option<&str>, capability: Capability) -> bool {
        match collection.filter(|name| !name.trim().is_empty()) {
            None => true,
            Some(name) => self.capabilities(name).allows(capability),
        }
    }
}

pub(crate) fn is_ceo_only(collection: &str) -> bool {
    collection.trim().eq_ignore_ascii_case(CEO_ONLY)
}
