//! Resource data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ResourceError, ResourceResult};
use crate::auth::UserId;
use crate::ledger::PointTransaction;

/// Resource ID type
pub type ResourceId = i64;

/// Paywalled content unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    pub description: String,
    /// Full content; `None` when withheld from the viewer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub author_id: UserId,
    pub is_free: bool,
    pub points_required: i64,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Points charged to unlock this resource
    pub fn price(&self) -> i64 {
        if self.is_free { 0 } else { self.points_required }
    }
}

/// Body for `POST /api/resources`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResource {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub points_required: i64,
}

impl NewResource {
    /// Validate and normalise: free resources carry no price, priced ones a
    /// positive one.
    pub fn validated(mut self) -> ResourceResult<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(ResourceError::InvalidResource(
                "Title must not be empty".to_string(),
            ));
        }

        if self.is_free {
            self.points_required = 0;
        } else if self.points_required <= 0 {
            return Err(ResourceError::InvalidResource(
                "Priced resources require points_required > 0".to_string(),
            ));
        }

        Ok(self)
    }
}

/// Entitlement of a user to a priced resource. Never revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    pub user_id: UserId,
    pub resource_id: ResourceId,
    pub transaction_id: i64,
    pub unlocked_at: DateTime<Utc>,
}

/// Outcome of a purchase on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub resource_id: ResourceId,
    /// Points debited (0 for free resources and administrators)
    pub charged: i64,
    pub balance: i64,
    pub transaction: Option<PointTransaction>,
    pub unlock: Option<UnlockRecord>,
}

/// Wire response of `POST /api/resources/{id}/purchase`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub balance: i64,
    pub message: String,
}

impl From<&PurchaseReceipt> for PurchaseResponse {
    fn from(receipt: &PurchaseReceipt) -> Self {
        let message = if receipt.charged > 0 {
            format!("Purchase successful, {} points spent", receipt.charged)
        } else {
            "Access granted, no points charged".to_string()
        };

        Self {
            success: true,
            balance: receipt.balance,
            message,
        }
    }
}

/// A resource as seen by a particular viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    #[serde(flatten)]
    pub resource: Resource,
    /// The viewer holds an unlock record for this resource
    pub is_purchased_by_user: bool,
    /// `content` is included
    pub is_unlocked: bool,
}

/// Ledger reference id of the purchase of `resource_id`
pub fn purchase_reference(resource_id: ResourceId) -> String {
    format!("resource_{resource_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_resource(is_free: bool, points_required: i64) -> NewResource {
        NewResource {
            title: "  Rust ownership  ".to_string(),
            description: String::new(),
            content: "body".to_string(),
            is_free,
            points_required,
        }
    }

    #[test]
    fn test_free_resource_price_is_zeroed() {
        let validated = new_resource(true, 40).validated().unwrap();
        assert_eq!(validated.points_required, 0);
        assert_eq!(validated.title, "Rust ownership");
    }

    #[test]
    fn test_priced_resource_requires_points() {
        assert!(matches!(
            new_resource(false, 0).validated(),
            Err(ResourceError::InvalidResource(_))
        ));
    }

    #[test]
    fn test_view_flattens_resource() {
        let view = ResourceView {
            resource: Resource {
                id: 4,
                title: "t".to_string(),
                description: String::new(),
                content: None,
                author_id: 1,
                is_free: false,
                points_required: 30,
                created_at: Utc::now(),
            },
            is_purchased_by_user: false,
            is_unlocked: false,
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["points_required"], 30);
        assert!(json.get("content").is_none());
    }
}
