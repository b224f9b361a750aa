//! `carehub-auth`: role-based capability resolution (pure policy + resolver).
//!
//! This crate is intentionally decoupled from HTTP and storage: identity and
//! role-permission data arrive through the [`PermissionSource`] trait.

pub mod access;
pub mod authorize;
pub mod identity;
pub mod permissions;
pub mod policy;
pub mod resolver;
pub mod roles;

pub use access::{Access, CollectionAccess, PermissionSet};
pub use authorize::{AuthzError, authorize};
pub use identity::{Identity, UserId, UserStatus};
pub use permissions::{Capabilities, Capability, PermissionEntry, PermissionMatrix};
pub use policy::{CEO_ONLY, PrivilegedRoles, RolePolicy};
pub use resolver::{PermissionResolver, PermissionSource, ResolverState, SourceError};
pub use roles::Role;
