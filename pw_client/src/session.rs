//! The signed-in user as seen by the client.
//!
//! [`SessionContext`] is passed explicitly to everything that needs the
//! user. It has many readers and one writer: the reconciliation step that
//! applies a server response. Nothing else mutates balance or entitlements.

use paywall::{
    auth::{CurrentUser, User},
    resources::{Entitlements, Resource, ResourceId, is_unlocked},
};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    api_client::PaywallApi,
    errors::{ClientError, ClientResult},
};

/// Snapshot of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user: User,
    pub unlocked: BTreeSet<ResourceId>,
}

impl SessionUser {
    pub fn points(&self) -> i64 {
        self.user.points
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    /// Whether the user may read `resource`'s content
    pub fn can_view(&self, resource: &Resource) -> bool {
        self.is_admin() || resource.author_id == self.user.id || is_unlocked(resource, Some(self))
    }
}

impl From<CurrentUser> for SessionUser {
    fn from(current: CurrentUser) -> Self {
        Self {
            user: current.user,
            unlocked: current.unlocked_resource_ids.into_iter().collect(),
        }
    }
}

impl Entitlements for SessionUser {
    fn owns(&self, resource_id: ResourceId) -> bool {
        self.unlocked.contains(&resource_id)
    }
}

/// Shared handle to the current session; cheap to clone
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<SessionUser>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<SessionUser>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<SessionUser>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current user
    pub fn current(&self) -> Option<SessionUser> {
        self.read().clone()
    }

    /// The current user, or [`ClientError::NotAuthenticated`]
    pub fn require(&self) -> ClientResult<SessionUser> {
        self.current().ok_or(ClientError::NotAuthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// Paywall decision for the current viewer; anonymous viewers only see
    /// free resources
    pub fn can_view(&self, resource: &Resource) -> bool {
        match self.read().as_ref() {
            Some(user) => user.can_view(resource),
            None => is_unlocked::<SessionUser>(resource, None),
        }
    }

    /// Replace local state with the server's view of the user
    pub async fn refresh(&self, api: &dyn PaywallApi) -> ClientResult<SessionUser> {
        match api.me().await {
            Ok(current) => {
                let user = SessionUser::from(current);
                *self.write() = Some(user.clone());
                Ok(user)
            }
            Err(ClientError::NotAuthenticated) => {
                self.clear();
                Err(ClientError::NotAuthenticated)
            }
            Err(err) => Err(err),
        }
    }

    /// Refetch only the balance after a money-moving action
    pub async fn refresh_balance(&self, api: &dyn PaywallApi) -> ClientResult<i64> {
        let balance = api.balance().await?;
        if let Some(user) = self.write().as_mut() {
            user.user.points = balance.balance;
            user.user.total_recharged = balance.total_recharged;
        }
        Ok(balance.balance)
    }

    /// Apply a server-confirmed purchase
    pub(crate) fn apply_purchase(&self, resource_id: ResourceId, balance: i64) {
        if let Some(user) = self.write().as_mut() {
            user.user.points = balance;
            user.unlocked.insert(resource_id);
        }
    }

    /// Record an entitlement the server reported as already owned
    pub(crate) fn apply_unlock(&self, resource_id: ResourceId) {
        if let Some(user) = self.write().as_mut() {
            user.unlocked.insert(resource_id);
        }
    }

    /// Forget the user (logout or rejected token)
    pub fn clear(&self) {
        *self.write() = None;
    }
}
