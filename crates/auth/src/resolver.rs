//! Permission resolver: identity + role matrix → synchronous capability checks.
//!
//! The resolver walks one state machine per [`PermissionResolver::load`]:
//!
//! ```text
//! LoadingIdentity ─┬─ privileged ──────────────────────→ Resolved(Unrestricted)
//!                  └─ other role → LoadingMatrix ──────→ Resolved(MatrixBacked)
//! ```
//!
//! There is no error state. A failed fetch resolves to "no data", which denies
//! every gated collection, the same answer a pending fetch gives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::access::{Access, CollectionAccess, PermissionSet};
use crate::authorize::authorize;
use crate::identity::Identity;
use crate::permissions::{Capability, PermissionEntry, PermissionMatrix};
use crate::policy::{PrivilegedRoles, RolePolicy};
use crate::Role;

/// Where identity and role-permission data come from.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// The "me" query.
    async fn fetch_identity(&self) -> Result<Identity, SourceError>;

    /// The "permissions by role" query.
    async fn fetch_role_permissions(&self, role: &Role) -> Result<Vec<PermissionEntry>, SourceError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("rejected by backend: {0}")]
    Rejected(String),
    #[error("unexpected payload: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverState {
    LoadingIdentity,
    LoadingMatrix {
        identity: Identity,
    },
    Resolved {
        /// `None` when the identity fetch failed.
        identity: Option<Identity>,
        policy: RolePolicy,
    },
}

impl ResolverState {
    pub fn is_loading(&self) -> bool {
        !matches!(self, ResolverState::Resolved { .. })
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            ResolverState::LoadingIdentity => None,
            ResolverState::LoadingMatrix { identity } => Some(identity),
            ResolverState::Resolved { identity, .. } => identity.as_ref(),
        }
    }

    pub fn policy(&self) -> Option<&RolePolicy> {
        match self {
            ResolverState::Resolved { policy, .. } => Some(policy),
            _ => None,
        }
    }
}

/// Resolves the current user's capabilities and answers lookups synchronously.
///
/// Lookups never block and never consult any response cache: until the
/// current `load` has produced a policy, every gated collection is denied.
pub struct PermissionResolver {
    source: Arc<dyn PermissionSource>,
    privileged: PrivilegedRoles,
    state: watch::Sender<ResolverState>,
    /// Bumped by every `load`/`reset`; older loads stop publishing.
    epoch: AtomicU64,
}

impl PermissionResolver {
    pub fn new(source: Arc<dyn PermissionSource>, privileged: PrivilegedRoles) -> Self {
        let (state, _) = watch::channel(ResolverState::LoadingIdentity);
        Self {
            source,
            privileged,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn privileged_roles(&self) -> &PrivilegedRoles {
        &self.privileged
    }

    /// Fetch identity, then (for non-privileged roles) the role's matrix.
    ///
    /// A newer `load` or `reset` supersedes this one; its results are dropped.
    pub async fn load(&self) {
        let epoch = self.begin(ResolverState::LoadingIdentity);

        let identity = match self.source.fetch_identity().await {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!("identity fetch failed; denying gated collections: {err}");
                self.publish(
                    epoch,
                    ResolverState::Resolved {
                        identity: None,
                        policy: RolePolicy::MatrixBacked(PermissionMatrix::default()),
                    },
                );
                return;
            }
        };

        if self.privileged.contains(&identity.role) {
            tracing::debug!(role = %identity.role, "privileged role; skipping permission matrix");
            self.publish(
                epoch,
                ResolverState::Resolved {
                    identity: Some(identity),
                    policy: RolePolicy::Unrestricted,
                },
            );
            return;
        }

        if identity.role.is_unknown() {
            tracing::warn!(user = %identity.id, "identity has no role; denying gated collections");
            self.publish(
                epoch,
                ResolverState::Resolved {
                    identity: Some(identity),
                    policy: RolePolicy::MatrixBacked(PermissionMatrix::default()),
                },
            );
            return;
        }

        let role = identity.role.clone();
        if !self.publish(epoch, ResolverState::LoadingMatrix { identity: identity.clone() }) {
            return;
        }

        let matrix = match self.source.fetch_role_permissions(&role).await {
            Ok(entries) => PermissionMatrix::from_entries(entries),
            Err(err) => {
                tracing::warn!(%role, "permission matrix fetch failed; treating as empty: {err}");
                PermissionMatrix::default()
            }
        };

        tracing::info!(%role, collections = matrix.len(), "permissions resolved");
        self.publish(
            epoch,
            ResolverState::Resolved {
                identity: Some(identity),
                policy: RolePolicy::MatrixBacked(matrix),
            },
        );
    }

    /// Forget everything (e.g. after logout). Any in-flight `load` is dropped.
    pub fn reset(&self) {
        self.begin(ResolverState::LoadingIdentity);
    }

    pub fn state(&self) -> ResolverState {
        self.state.borrow().clone()
    }

    /// Receiver that changes whenever the state machine advances.
    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state.subscribe()
    }

    pub fn resolve_for_collection(&self, collection: &str) -> CollectionAccess {
        match self.state.borrow().policy() {
            Some(policy) => CollectionAccess::resolved(policy.capabilities(collection)),
            None => CollectionAccess::loading(),
        }
    }

    pub fn resolve_all(&self) -> PermissionSet {
        match self.state.borrow().policy() {
            Some(RolePolicy::Unrestricted) => PermissionSet {
                is_ceo: true,
                ..PermissionSet::default()
            },
            Some(RolePolicy::MatrixBacked(matrix)) => PermissionSet {
                permissions: matrix.to_map(),
                is_loading: false,
                is_ceo: false,
            },
            None => PermissionSet::loading(),
        }
    }

    /// Route-guard decision for one capability on one collection.
    pub fn guard(&self, collection: Option<&str>, capability: Capability) -> Access {
        if collection.is_none_or(|name| name.trim().is_empty()) {
            return Access::Allowed;
        }

        let state = self.state.borrow();
        let Some(policy) = state.policy() else {
            return Access::Pending;
        };
        match authorize(policy, collection, capability) {
            Ok(()) => Access::Allowed,
            Err(err) => {
                tracing::debug!("access denied: {err}");
                Access::Denied
            }
        }
    }

    /// Start a new epoch and publish its first state.
    ///
    /// The epoch only moves while the watch lock is held, so a `publish` for
    /// an older epoch can never land after this state.
    fn begin(&self, first: ResolverState) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|state| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *state = first;
        });
        epoch
    }

    fn publish(&self, epoch: u64, next: ResolverState) -> bool {
        let published = self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            *state = next;
            true
        });
        if !published {
            tracing::debug!("superseded permission load; dropping result");
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Semaphore;

    use crate::permissions::Capabilities;

    struct FakeSource {
        identity: Result<Identity, SourceError>,
        entries: Result<Vec<PermissionEntry>, SourceError>,
        identity_calls: AtomicUsize,
        matrix_calls: AtomicUsize,
        identity_gate: Option<Arc<Semaphore>>,
        matrix_gate: Option<Arc<Semaphore>>,
    }

    impl FakeSource {
        fn new(role: &'static str, entries: Vec<PermissionEntry>) -> Self {
            Self {
                identity: Ok(identity(role)),
                entries: Ok(entries),
                identity_calls: AtomicUsize::new(0),
                matrix_calls: AtomicUsize::new(0),
                identity_gate: None,
                matrix_gate: None,
            }
        }
    }

    #[async_trait]
    impl PermissionSource for FakeSource {
        async fn fetch_identity(&self) -> Result<Identity, SourceError> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.identity_gate {
                let _permit = gate.acquire().await.map_err(|e| SourceError::Request(e.to_string()))?;
            }
            self.identity.clone()
        }

        async fn fetch_role_permissions(&self, _role: &Role) -> Result<Vec<PermissionEntry>, SourceError> {
            self.matrix_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.matrix_gate {
                let _permit = gate.acquire().await.map_err(|e| SourceError::Request(e.to_string()))?;
            }
            self.entries.clone()
        }
    }

    fn identity(role: &'static str) -> Identity {
        serde_json::from_value(serde_json::json!({ "id": "u-1", "name": "Test User", "role": role }))
            .unwrap()
    }

    fn billing_reader() -> Vec<PermissionEntry> {
        vec![PermissionEntry::new(
            "billing",
            Capabilities { read: true, create: false, ..Capabilities::NONE },
        )]
    }

    fn resolver(source: FakeSource) -> (Arc<FakeSource>, PermissionResolver) {
        let source = Arc::new(source);
        let resolver = PermissionResolver::new(source.clone(), PrivilegedRoles::default());
        (source, resolver)
    }

    #[tokio::test]
    async fn matrix_lookup_is_case_insensitive() {
        let (_, resolver) = resolver(FakeSource::new("accountant", billing_reader()));
        resolver.load().await;

        let access = resolver.resolve_for_collection("BILLING");
        assert_eq!(
            access,
            CollectionAccess {
                can_create: false,
                can_read: true,
                can_update: false,
                can_delete: false,
                is_loading: false,
            }
        );
    }

    #[tokio::test]
    async fn missing_entry_denies_everything() {
        let (_, resolver) = resolver(FakeSource::new("accountant", billing_reader()));
        resolver.load().await;

        let access = resolver.resolve_for_collection("radiology");
        assert_eq!(access.capabilities(), Capabilities::NONE);
        assert!(!access.is_loading);
    }

    #[tokio::test]
    async fn privileged_role_skips_matrix_fetch() {
        let (source, resolver) = resolver(FakeSource::new("ceo", Vec::new()));
        resolver.load().await;

        assert_eq!(source.matrix_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.resolve_for_collection("anything").capabilities(), Capabilities::ALL);

        let all = resolver.resolve_all();
        assert!(all.is_ceo);
        assert!(!all.is_loading);
        assert!(all.can_read(Some("ceo_only")));
    }

    #[tokio::test]
    async fn pending_identity_reports_loading() {
        let gate = Arc::new(Semaphore::new(0));
        let mut fake = FakeSource::new("ceo", Vec::new());
        fake.identity_gate = Some(gate.clone());
        let (source, resolver) = resolver(fake);
        let resolver = Arc::new(resolver);

        let task = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.load().await }
        });

        while source.identity_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let access = resolver.resolve_for_collection("billing");
        assert!(access.is_loading);
        assert_eq!(access.capabilities(), Capabilities::NONE);
        let all = resolver.resolve_all();
        assert!(all.is_loading && !all.is_ceo);
        assert!(all.can_read(None));
        assert!(!all.can_read(Some("ceo_only")));
        assert_eq!(resolver.guard(Some("billing"), Capability::Read), Access::Pending);
        assert_eq!(resolver.guard(None, Capability::Read), Access::Allowed);

        gate.add_permits(1);
        task.await.unwrap();
        assert!(resolver.resolve_all().is_ceo);
    }

    #[tokio::test]
    async fn failed_matrix_fetch_resolves_to_denied() {
        let mut fake = FakeSource::new("nurse", Vec::new());
        fake.entries = Err(SourceError::Request("timeout".into()));
        let (_, resolver) = resolver(fake);
        resolver.load().await;

        let access = resolver.resolve_for_collection("patient");
        assert!(!access.is_loading);
        assert_eq!(access.capabilities(), Capabilities::NONE);
        assert_eq!(resolver.guard(Some("patient"), Capability::Read), Access::Denied);
    }

    #[tokio::test]
    async fn failed_identity_fetch_resolves_without_identity() {
        let mut fake = FakeSource::new("nurse", billing_reader());
        fake.identity = Err(SourceError::Rejected("session expired".into()));
        let (source, resolver) = resolver(fake);
        resolver.load().await;

        let state = resolver.state();
        assert!(!state.is_loading());
        assert!(state.identity().is_none());
        assert_eq!(source.matrix_calls.load(Ordering::SeqCst), 0);
        assert!(!resolver.resolve_all().can_read(Some("billing")));
    }

    #[tokio::test]
    async fn unknown_role_skips_matrix_fetch() {
        let (source, resolver) = resolver(FakeSource::new("", billing_reader()));
        resolver.load().await;

        assert_eq!(source.matrix_calls.load(Ordering::SeqCst), 0);
        assert!(!resolver.resolve_all().can_read(Some("billing")));
    }

    #[tokio::test]
    async fn resolve_all_exposes_lowercased_matrix() {
        let entries = vec![PermissionEntry::new("Patient", Capabilities::ALL)];
        let (_, resolver) = resolver(FakeSource::new("doctor", entries));
        resolver.load().await;

        let all = resolver.resolve_all();
        assert!(!all.is_ceo);
        assert_eq!(all.permissions.get("patient"), Some(&Capabilities::ALL));
        assert!(all.can_read(Some("PATIENT")));
        assert!(!all.can_read(Some("ceo_only")));
        assert_eq!(resolver.guard(Some("patient"), Capability::Delete), Access::Allowed);
    }

    #[tokio::test]
    async fn reset_returns_to_loading_and_notifies() {
        let (_, resolver) = resolver(FakeSource::new("doctor", billing_reader()));
        let mut rx = resolver.subscribe();
        resolver.load().await;
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_loading());

        resolver.reset();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ResolverState::LoadingIdentity);
        assert!(resolver.resolve_for_collection("billing").is_loading);
    }

    #[tokio::test]
    async fn reset_during_matrix_fetch_wins() {
        let gate = Arc::new(Semaphore::new(0));
        let mut fake = FakeSource::new("doctor", billing_reader());
        fake.matrix_gate = Some(gate.clone());
        let (source, resolver) = resolver(fake);
        let resolver = Arc::new(resolver);

        let task = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.load().await }
        });
        while source.matrix_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(resolver.state(), ResolverState::LoadingMatrix { .. }));

        resolver.reset();
        gate.add_permits(1);
        task.await.unwrap();

        assert_eq!(resolver.state(), ResolverState::LoadingIdentity);
        assert_eq!(resolver.guard(Some("billing"), Capability::Read), Access::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reset_is_never_overwritten() {
        for _ in 0..200 {
            let (_, resolver) = resolver(FakeSource::new("doctor", billing_reader()));
            let resolver = Arc::new(resolver);

            let load = tokio::spawn({
                let resolver = resolver.clone();
                async move { resolver.load().await }
            });
            let reset = tokio::spawn({
                let resolver = resolver.clone();
                async move { resolver.begin(ResolverState::LoadingIdentity) }
            });
            let reset_epoch = reset.await.unwrap();
            load.await.unwrap();

            // When the reset was the last epoch started, its state must stand.
            if resolver.epoch.load(Ordering::SeqCst) == reset_epoch {
                assert_eq!(resolver.state(), ResolverState::LoadingIdentity);
            }
        }
    }
}
