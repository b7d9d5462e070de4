//! Payment session for one recharge plan.
//!
//! The user picks a payment method that has a QR code, pays off-platform,
//! then confirms. Confirmation creates a pending order; an administrator
//! decides it later. Once submitted the session is finished: closing it
//! never cancels the order, and a new session starts a new order.

use paywall::recharge::{NewRechargeOrder, PaymentMethod, RechargeOrder, RechargePlan};

use crate::{
    api_client::PaywallApi,
    errors::{ClientError, ClientResult},
};

/// What the payment dialog shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentPhase {
    ChoosingMethod,
    AwaitingPayment { method: PaymentMethod },
    /// Order created, pending administrator review
    Submitted(RechargeOrder),
}

#[derive(Debug)]
pub struct PaymentSession {
    plan: RechargePlan,
    methods: Vec<PaymentMethod>,
    phase: PaymentPhase,
    payment_proof: Option<String>,
}

impl PaymentSession {
    /// Open a session for `plan`.
    ///
    /// Fails with [`ClientError::NoPaymentMethodAvailable`] when the plan has
    /// no QR code configured for any method; no order is created.
    pub fn open(plan: RechargePlan) -> ClientResult<Self> {
        let methods = plan.payment_methods();
        if methods.is_empty() {
            return Err(ClientError::NoPaymentMethodAvailable);
        }

        // A single method needs no picker
        let phase = match methods.as_slice() {
            [only] => PaymentPhase::AwaitingPayment { method: *only },
            _ => PaymentPhase::ChoosingMethod,
        };

        Ok(Self {
            plan,
            methods,
            phase,
            payment_proof: None,
        })
    }

    pub fn plan(&self) -> &RechargePlan {
        &self.plan
    }

    /// Methods with a configured QR code
    pub fn methods(&self) -> &[PaymentMethod] {
        &self.methods
    }

    pub fn phase(&self) -> &PaymentPhase {
        &self.phase
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self.phase, PaymentPhase::Submitted(_))
    }

    /// QR code of the selected method, if one is selected
    pub fn qr_code(&self) -> Option<&str> {
        match &self.phase {
            PaymentPhase::AwaitingPayment { method } => self.plan.qr_code(*method),
            _ => None,
        }
    }

    /// Switch to `method` and return its QR code
    pub fn select_method(&mut self, method: PaymentMethod) -> ClientResult<&str> {
        if self.is_submitted() {
            return Err(ClientError::SessionClosed);
        }
        if !self.methods.contains(&method) {
            return Err(ClientError::OrderCreationFailed(format!(
                "payment method {method} is not available for this plan"
            )));
        }

        self.phase = PaymentPhase::AwaitingPayment { method };
        self.plan
            .qr_code(method)
            .ok_or(ClientError::NoPaymentMethodAvailable)
    }

    /// Attach an optional proof-of-payment URL to the order
    pub fn set_payment_proof(&mut self, proof: Option<String>) {
        self.payment_proof = proof.filter(|p| !p.trim().is_empty());
    }

    /// The user reports having paid: create the pending order.
    ///
    /// On failure the session stays open so the user can retry; only a
    /// server acknowledgement moves it to `Submitted`.
    pub async fn confirm_paid(&mut self, api: &dyn PaywallApi) -> ClientResult<RechargeOrder> {
        let method = match &self.phase {
            PaymentPhase::AwaitingPayment { method } => *method,
            PaymentPhase::ChoosingMethod => {
                return Err(ClientError::OrderCreationFailed(
                    "select a payment method first".to_string(),
                ));
            }
            PaymentPhase::Submitted(_) => return Err(ClientError::SessionClosed),
        };

        let mut request = NewRechargeOrder::for_plan(&self.plan, method);
        request.payment_proof = self.payment_proof.clone();

        let order = api.create_order(&request).await.map_err(|err| match err {
            ClientError::NotAuthenticated | ClientError::Timeout => err,
            other => ClientError::OrderCreationFailed(other.to_string()),
        })?;

        self.phase = PaymentPhase::Submitted(order.clone());
        Ok(order)
    }

    /// Dismiss the dialog; a submitted order stays with the server
    pub fn close(self) -> Option<RechargeOrder> {
        match self.phase {
            PaymentPhase::Submitted(order) => Some(order),
            _ => None,
        }
    }
}
