//! Recharge data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::errors::{RechargeError, RechargeResult};
use crate::auth::UserId;

/// Plan ID type
pub type PlanId = i64;

/// Order ID type
pub type OrderId = i64;

/// Off-platform payment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Wechat,
    Alipay,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::Wechat, PaymentMethod::Alipay];
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Wechat => write!(f, "wechat"),
            PaymentMethod::Alipay => write!(f, "alipay"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wechat" => Ok(PaymentMethod::Wechat),
            "alipay" => Ok(PaymentMethod::Alipay),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Lifecycle state of a recharge order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Validate a status change. Only `PENDING -> APPROVED | REJECTED` is legal.
    pub fn transition(self, to: OrderStatus) -> RechargeResult<OrderStatus> {
        match (self, to) {
            (OrderStatus::Pending, OrderStatus::Approved | OrderStatus::Rejected) => Ok(to),
            (from, to) => Err(RechargeError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Approved => write!(f, "APPROVED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "APPROVED" => Ok(OrderStatus::Approved),
            "REJECTED" => Ok(OrderStatus::Rejected),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// Catalogue entry offered to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargePlan {
    pub id: PlanId,
    pub name: String,
    pub plan_type: String,
    /// Points credited on approval
    pub points: i64,
    /// Price in minor currency units
    pub price: i64,
    pub description: Option<String>,
    /// JSON array of feature strings
    pub features: Option<String>,
    pub wechat_qr_code: Option<String>,
    pub alipay_qr_code: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    /// Display sort key, ascending
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RechargePlan {
    /// Configured QR code for `method`, ignoring blank values
    pub fn qr_code(&self, method: PaymentMethod) -> Option<&str> {
        let code = match method {
            PaymentMethod::Wechat => self.wechat_qr_code.as_deref(),
            PaymentMethod::Alipay => self.alipay_qr_code.as_deref(),
        };
        code.filter(|c| !c.trim().is_empty())
    }

    pub fn has_qr_code(&self, method: PaymentMethod) -> bool {
        self.qr_code(method).is_some()
    }

    /// Payment methods with a configured QR code
    pub fn payment_methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.has_qr_code(*m))
            .collect()
    }

    /// Decoded feature list; malformed JSON yields an empty list
    pub fn feature_list(&self) -> Vec<String> {
        self.features
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Body for `POST /api/recharge/plans`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRechargePlan {
    pub name: String,
    #[serde(default)]
    pub plan_type: String,
    pub points: i64,
    pub price: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Option<String>,
    #[serde(default)]
    pub wechat_qr_code: Option<String>,
    #[serde(default)]
    pub alipay_qr_code: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub order: i32,
}

fn default_true() -> bool {
    true
}

impl NewRechargePlan {
    pub fn validate(&self) -> RechargeResult<()> {
        validate_plan_fields(&self.name, self.points, self.price)
    }
}

/// Body for `PUT /api/recharge/plans/{id}`; absent fields are left untouched
/// and a blank QR code clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RechargePlanUpdate {
    pub name: Option<String>,
    pub plan_type: Option<String>,
    pub points: Option<i64>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub features: Option<String>,
    pub wechat_qr_code: Option<String>,
    pub alipay_qr_code: Option<String>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub order: Option<i32>,
}

impl RechargePlanUpdate {
    /// Apply onto `plan` and validate the result
    pub fn apply(self, plan: &mut RechargePlan, now: DateTime<Utc>) -> RechargeResult<()> {
        let blank_to_none = |s: String| (!s.trim().is_empty()).then_some(s);

        if let Some(name) = self.name {
            plan.name = name;
        }
        if let Some(plan_type) = self.plan_type {
            plan.plan_type = plan_type;
        }
        if let Some(points) = self.points {
            plan.points = points;
        }
        if let Some(price) = self.price {
            plan.price = price;
        }
        if let Some(description) = self.description {
            plan.description = blank_to_none(description);
        }
        if let Some(features) = self.features {
            plan.features = blank_to_none(features);
        }
        if let Some(code) = self.wechat_qr_code {
            plan.wechat_qr_code = blank_to_none(code);
        }
        if let Some(code) = self.alipay_qr_code {
            plan.alipay_qr_code = blank_to_none(code);
        }
        if let Some(is_active) = self.is_active {
            plan.is_active = is_active;
        }
        if let Some(is_featured) = self.is_featured {
            plan.is_featured = is_featured;
        }
        if let Some(order) = self.order {
            plan.order = order;
        }
        plan.updated_at = Some(now);

        validate_plan_fields(&plan.name, plan.points, plan.price)
    }
}

fn validate_plan_fields(name: &str, points: i64, price: i64) -> RechargeResult<()> {
    if name.trim().is_empty() {
        return Err(RechargeError::InvalidPlan("Name must not be empty".to_string()));
    }
    if points <= 0 {
        return Err(RechargeError::InvalidPlan("Points must be positive".to_string()));
    }
    if price <= 0 {
        return Err(RechargeError::InvalidPlan("Price must be positive".to_string()));
    }
    Ok(())
}

/// Body for `POST /api/recharge/orders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRechargeOrder {
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    pub amount: i64,
    pub points: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_proof: Option<String>,
}

impl NewRechargeOrder {
    /// Order for the full price of `plan`
    pub fn for_plan(plan: &RechargePlan, payment_method: PaymentMethod) -> Self {
        Self {
            plan_id: Some(plan.id),
            amount: plan.price,
            points: plan.points,
            payment_method,
            payment_proof: None,
        }
    }
}

/// A user's claim of an off-platform payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeOrder {
    pub id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub plan_id: Option<PlanId>,
    pub amount: i64,
    pub points: i64,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_proof: Option<String>,
    pub admin_note: Option<String>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body for `PUT /api/recharge/orders/{id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReview {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub admin_note: Option<String>,
}

/// What a review did to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Only the note changed
    NoteUpdated,
    /// Order approved; the caller must credit `order.points`
    Approved,
    Rejected,
}

impl RechargeOrder {
    /// Apply an administrator review in place.
    ///
    /// Ledger effects are the caller's job and only follow
    /// [`ReviewOutcome::Approved`].
    pub fn apply_review(
        &mut self,
        approver: UserId,
        review: &OrderReview,
        now: DateTime<Utc>,
    ) -> RechargeResult<ReviewOutcome> {
        let note = review
            .admin_note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let outcome = match review.status {
            None => {
                let Some(note) = note else {
                    return Err(RechargeError::InvalidOrder(
                        "Nothing to update".to_string(),
                    ));
                };
                self.admin_note = Some(note.to_string());
                ReviewOutcome::NoteUpdated
            }
            Some(to) => {
                let next = self.status.transition(to)?;
                if next == OrderStatus::Rejected && note.is_none() {
                    return Err(RechargeError::InvalidOrder(
                        "A rejection requires an admin_note".to_string(),
                    ));
                }

                self.status = next;
                self.approved_by = Some(approver);
                self.approved_at = Some(now);
                if let Some(note) = note {
                    self.admin_note = Some(note.to_string());
                }

                if next == OrderStatus::Approved {
                    ReviewOutcome::Approved
                } else {
                    ReviewOutcome::Rejected
                }
            }
        };

        self.updated_at = Some(now);
        Ok(outcome)
    }
}

/// Human-readable order number: `R` + `YYYYMMDDHHMMSS` + 8 uppercase hex chars
pub fn generate_order_no(now: DateTime<Utc>) -> String {
    format!("R{}{:08X}", now.format("%Y%m%d%H%M%S"), rand::random::<u32>())
}

/// Description of the RECHARGE transaction written on approval
pub fn recharge_description(order_no: &str) -> String {
    format!("Recharge order: {order_no}")
}
