//! Paywall visibility rule.

use std::collections::{BTreeSet, HashSet};

use super::models::{Resource, ResourceId};

/// Anything that knows which resources a user has paid for.
pub trait Entitlements {
    fn owns(&self, resource_id: ResourceId) -> bool;
}

impl Entitlements for HashSet<ResourceId> {
    fn owns(&self, resource_id: ResourceId) -> bool {
        self.contains(&resource_id)
    }
}

impl Entitlements for BTreeSet<ResourceId> {
    fn owns(&self, resource_id: ResourceId) -> bool {
        self.contains(&resource_id)
    }
}

impl Entitlements for [ResourceId] {
    fn owns(&self, resource_id: ResourceId) -> bool {
        self.contains(&resource_id)
    }
}

/// Whether the full content of `resource` is visible to `user`.
///
/// Free resources are always visible. Priced resources are visible only to a
/// present user who owns them; anonymous visitors never see paid content.
pub fn is_unlocked<E>(resource: &Resource, user: Option<&E>) -> bool
where
    E: Entitlements + ?Sized,
{
    resource.is_free || user.is_some_and(|u| u.owns(resource.id))
}
