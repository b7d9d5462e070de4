//! Resource manager implementation.

use super::{
    errors::{ResourceError, ResourceResult},
    gate,
    models::{NewResource, PurchaseReceipt, Resource, ResourceId, ResourceView},
};
use crate::auth::{Actor, UserId};
use crate::db::{LedgerRepository, ResourceRepository};
use std::sync::Arc;

/// Resource manager
#[derive(Clone)]
pub struct ResourceManager {
    resources: Arc<dyn ResourceRepository>,
    ledger: Arc<dyn LedgerRepository>,
}

impl ResourceManager {
    /// Create a new resource manager
    pub fn new(resources: Arc<dyn ResourceRepository>, ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { resources, ledger }
    }

    /// Publish a resource authored by `actor`
    pub async fn create(&self, actor: &Actor, resource: NewResource) -> ResourceResult<Resource> {
        let resource = resource.validated()?;
        let created = self.resources.create_resource(actor.user_id, &resource).await?;

        log::info!(
            "User {} published resource {} ({} points)",
            actor.user_id,
            created.id,
            created.price()
        );

        Ok(created)
    }

    /// Get a resource including its content
    pub async fn get(&self, resource_id: ResourceId) -> ResourceResult<Resource> {
        self.resources
            .find_resource(resource_id)
            .await?
            .ok_or(ResourceError::NotFound(resource_id))
    }

    /// Resource as seen by `viewer`; content is withheld while locked.
    ///
    /// Administrators and authors always see the content.
    pub async fn view(
        &self,
        resource_id: ResourceId,
        viewer: Option<&Actor>,
    ) -> ResourceResult<ResourceView> {
        let mut resource = self.get(resource_id).await?;

        let owned = match viewer {
            Some(actor) => Some(self.resources.unlocked_resource_ids(actor.user_id).await?),
            None => None,
        };
        let is_purchased_by_user = owned.as_ref().is_some_and(|ids| ids.contains(&resource_id));

        let privileged =
            viewer.is_some_and(|actor| actor.is_admin() || actor.user_id == resource.author_id);
        let is_unlocked = privileged || gate::is_unlocked(&resource, owned.as_ref());

        if !is_unlocked {
            resource.content = None;
        }

        Ok(ResourceView {
            resource,
            is_purchased_by_user,
            is_unlocked,
        })
    }

    /// IDs of every resource the user has unlocked
    pub async fn unlocked_resource_ids(&self, user_id: UserId) -> ResourceResult<Vec<ResourceId>> {
        Ok(self
            .resources
            .unlocked_resource_ids(user_id)
            .await?
            .into_iter()
            .collect())
    }

    /// Spend points to unlock a resource
    ///
    /// Free resources, administrators and the resource's author are never
    /// charged and leave no unlock record. Otherwise the debit and the unlock are one atomic unit.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - Resource does not exist
    /// * `ResourceError::AlreadyUnlocked` - User already owns it; nothing was charged
    /// * `ResourceError::InsufficientBalance` - Balance below the price; nothing was charged
    pub async fn purchase(
        &self,
        actor: &Actor,
        resource_id: ResourceId,
    ) -> ResourceResult<PurchaseReceipt> {
        let resource = self.get(resource_id).await?;

        if resource.is_free || actor.is_admin() || actor.user_id == resource.author_id {
            let balance = self.ledger.balance(actor.user_id).await?;
            log::info!(
                "User {} opened resource {} without charge",
                actor.user_id,
                resource_id
            );
            return Ok(PurchaseReceipt {
                resource_id,
                charged: 0,
                balance: balance.balance,
                transaction: None,
                unlock: None,
            });
        }

        match self.resources.purchase(actor.user_id, &resource).await {
            Ok(receipt) => {
                log::info!(
                    "User {} purchased resource {} for {} points, balance {}",
                    actor.user_id,
                    resource_id,
                    receipt.charged,
                    receipt.balance
                );
                Ok(receipt)
            }
            Err(err) => {
                log::warn!(
                    "Purchase of resource {} by user {} refused: {}",
                    resource_id,
                    actor.user_id,
                    err
                );
                Err(err)
            }
        }
    }
}
