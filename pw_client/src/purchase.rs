//! Purchase flow for paywalled resources.
//!
//! The server is the only authority on balance and ownership. The local
//! checks here only save a round trip for requests that would certainly
//! fail; local state changes only after the server confirms.

use paywall::resources::{Resource, ResourceId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::{
    api_client::PaywallApi,
    errors::{ClientError, ClientResult},
    session::{SessionContext, SessionUser},
};

/// How a purchase request resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The server charged the user and recorded the unlock
    Charged { balance: i64, message: String },
    /// The user already owned the resource; nothing was charged
    AlreadyUnlocked,
    /// Free resources need no purchase
    Free,
    /// Administrators read everything without paying
    Privileged,
}

impl PurchaseOutcome {
    /// Points were deducted by this call
    pub fn charged(&self) -> bool {
        matches!(self, PurchaseOutcome::Charged { .. })
    }
}

/// Coordinates purchases against the server and applies the confirmed
/// result to the session
pub struct PurchaseCoordinator {
    api: Arc<dyn PaywallApi>,
    session: SessionContext,
    in_flight: Arc<Mutex<HashSet<ResourceId>>>,
}

/// Releases the in-flight slot of one resource on drop
struct InFlightGuard {
    slots: Arc<Mutex<HashSet<ResourceId>>>,
    resource_id: ResourceId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.resource_id);
    }
}

impl PurchaseCoordinator {
    pub fn new(api: Arc<dyn PaywallApi>, session: SessionContext) -> Self {
        Self {
            api,
            session,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A purchase of `resource_id` is waiting for the server
    pub fn is_in_flight(&self, resource_id: ResourceId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&resource_id)
    }

    fn acquire(&self, resource_id: ResourceId) -> ClientResult<InFlightGuard> {
        let mut slots = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !slots.insert(resource_id) {
            return Err(ClientError::RequestInFlight);
        }
        Ok(InFlightGuard {
            slots: self.in_flight.clone(),
            resource_id,
        })
    }

    /// Unlock `resource` for the signed-in user.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotAuthenticated`]: no session, or the server
    ///   rejected the token
    /// - [`ClientError::InsufficientBalance`]: detected locally or by the
    ///   server; the session is left untouched
    /// - [`ClientError::RequestInFlight`]: a purchase of the same resource
    ///   has not resolved yet
    /// - network, timeout and server errors, with the session untouched
    pub async fn purchase(&self, resource: &Resource) -> ClientResult<PurchaseOutcome> {
        let user = self.session.require()?;

        if let Some(outcome) = local_outcome(&user, resource)? {
            return Ok(outcome);
        }

        let _guard = self.acquire(resource.id)?;

        match self.api.purchase(resource.id).await {
            Ok(response) => {
                self.session.apply_purchase(resource.id, response.balance);
                Ok(PurchaseOutcome::Charged {
                    balance: response.balance,
                    message: response.message,
                })
            }
            Err(ClientError::AlreadyUnlocked) => {
                self.session.apply_unlock(resource.id);
                Ok(PurchaseOutcome::AlreadyUnlocked)
            }
            Err(ClientError::NotAuthenticated) => {
                self.session.clear();
                Err(ClientError::NotAuthenticated)
            }
            // Fill in the amounts from the last known balance
            Err(ClientError::PaymentRequired(_)) => Err(ClientError::InsufficientBalance {
                balance: user.points(),
                required: resource.price(),
            }),
            Err(err) => Err(err),
        }
    }
}

/// Outcomes decided without the server, or the local balance guard
fn local_outcome(user: &SessionUser, resource: &Resource) -> ClientResult<Option<PurchaseOutcome>> {
    if resource.is_free {
        return Ok(Some(PurchaseOutcome::Free));
    }
    if user.is_admin() {
        return Ok(Some(PurchaseOutcome::Privileged));
    }
    if user.can_view(resource) {
        return Ok(Some(PurchaseOutcome::AlreadyUnlocked));
    }
    if user.points() < resource.price() {
        return Err(ClientError::InsufficientBalance {
            balance: user.points(),
            required: resource.price(),
        });
    }
    Ok(None)
}
