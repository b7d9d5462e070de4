//! Recharge plans and the moderated recharge order workflow.
//!
//! Orders only record a user's claim of an off-platform payment. Points are
//! credited when an administrator approves the order, which writes exactly
//! one RECHARGE transaction in the same atomic unit as the status change.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED
//!    │
//!    └────reject─────▶ REJECTED
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{RechargeError, RechargeResult};
pub use manager::RechargeManager;
pub use models::{
    NewRechargeOrder, NewRechargePlan, OrderId, OrderReview, OrderStatus, PaymentMethod, PlanId,
    RechargeOrder, RechargePlan, RechargePlanUpdate, ReviewOutcome, generate_order_no,
    recharge_description,
};
