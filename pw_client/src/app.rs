//! Command executor behind the interactive prompt.
//!
//! [`ClientApp`] owns the API client, the session context and at most one
//! open payment session. Each command returns the text to print; errors are
//! returned for the caller to render.

use paywall::{
    auth::{AuthResponse, RegisterRequest},
    ledger::{AdjustRequest, TransactionType},
    recharge::{OrderReview, RechargeOrder},
    resources::{NewResource, ResourceView},
};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    api_client::{ApiClient, PaywallApi},
    commands::{Command, HELP_TEXT},
    errors::{ClientError, ClientResult},
    payment_session::{PaymentPhase, PaymentSession},
    purchase::{PurchaseCoordinator, PurchaseOutcome},
    session::SessionContext,
    state::RequestState,
    token_store::{StoredToken, TokenStore},
    watcher::{DEFAULT_POLL_INTERVAL, OrderWatcher},
};

pub struct ClientApp {
    api: Arc<ApiClient>,
    session: SessionContext,
    purchases: PurchaseCoordinator,
    payment: Option<PaymentSession>,
    last_purchase: RequestState<PurchaseOutcome>,
    tokens: Option<TokenStore>,
    poll_interval: Duration,
}

impl ClientApp {
    pub fn new(api: Arc<ApiClient>, tokens: Option<TokenStore>) -> Self {
        let session = SessionContext::new();
        let purchases = PurchaseCoordinator::new(api.clone(), session.clone());
        Self {
            api,
            session,
            purchases,
            payment: None,
            last_purchase: RequestState::default(),
            tokens,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Lifecycle of the most recent purchase, for rendering the buy action
    pub fn last_purchase(&self) -> &RequestState<PurchaseOutcome> {
        &self.last_purchase
    }

    /// Restore a persisted token and validate it against the server.
    ///
    /// Returns the username when the token was accepted.
    pub async fn resume(&self) -> ClientResult<Option<String>> {
        let Some(store) = &self.tokens else {
            return Ok(None);
        };
        let Some(stored) = store.load()? else {
            return Ok(None);
        };

        self.api.set_access_token(Some(stored.access_token)).await;
        match self.session.refresh(self.api.as_ref()).await {
            Ok(user) => Ok(Some(user.user.username)),
            Err(ClientError::NotAuthenticated) => {
                store.clear()?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Run one command and return its output
    pub async fn execute(&mut self, command: Command) -> ClientResult<String> {
        let result = self.dispatch(command).await;
        if matches!(result, Err(ClientError::NotAuthenticated)) {
            self.forget_session()?;
        }
        result
    }

    async fn dispatch(&mut self, command: Command) -> ClientResult<String> {
        match command {
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::Quit => Ok("Bye".to_string()),
            Command::Register { username, password } => {
                let auth = self
                    .api
                    .register(RegisterRequest {
                        display_name: username.clone(),
                        username,
                        password,
                        email: None,
                    })
                    .await?;
                self.signed_in(auth).await
            }
            Command::Login { username, password } => {
                let auth = self.api.login(&username, &password).await?;
                self.signed_in(auth).await
            }
            Command::Logout => {
                self.api.set_access_token(None).await;
                self.forget_session()?;
                Ok("Logged out".to_string())
            }
            Command::Me => {
                let user = self.session.refresh(self.api.as_ref()).await?;
                let unlocked: Vec<String> = user.unlocked.iter().map(|id| id.to_string()).collect();
                Ok(format!(
                    "{} ({}) #{}\n  points: {}\n  recharged: {}\n  unlocked: [{}]",
                    user.user.display_name,
                    user.user.role,
                    user.user.id,
                    user.points(),
                    user.user.total_recharged,
                    unlocked.join(", ")
                ))
            }
            Command::Balance => {
                self.session.require()?;
                let balance = self.session.refresh_balance(self.api.as_ref()).await?;
                Ok(format!("Balance: {balance} points"))
            }
            Command::History { skip, limit } => {
                let entries = self.api.transactions(skip, limit).await?;
                if entries.is_empty() {
                    return Ok("No transactions".to_string());
                }
                let mut out = String::new();
                for entry in entries {
                    let _ = writeln!(
                        out,
                        "{} {:>14} {:>+7} -> {:>7}  {}",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.transaction_type.to_string(),
                        entry.amount,
                        entry.balance_after,
                        entry.description
                    );
                }
                Ok(out.trim_end().to_string())
            }
            Command::Plans => {
                let plans = self.api.list_plans(false).await?;
                if plans.is_empty() {
                    return Ok("No recharge plans available".to_string());
                }
                let mut out = String::new();
                for plan in plans {
                    let methods: Vec<String> =
                        plan.payment_methods().iter().map(|m| m.to_string()).collect();
                    let _ = writeln!(
                        out,
                        "{}. {} - {} points for {} [{}]{}",
                        plan.id,
                        plan.name,
                        plan.points,
                        plan.price,
                        methods.join(", "),
                        if plan.is_featured { " *" } else { "" }
                    );
                }
                Ok(out.trim_end().to_string())
            }
            Command::Recharge(plan_id) => {
                self.session.require()?;
                let plan = self
                    .api
                    .list_plans(false)
                    .await?
                    .into_iter()
                    .find(|plan| plan.id == plan_id)
                    .ok_or_else(|| ClientError::NotFound(format!("plan {plan_id}")))?;

                // Reopening starts a new order
                let payment = PaymentSession::open(plan)?;
                let out = describe_payment(&payment);
                self.payment = Some(payment);
                Ok(out)
            }
            Command::Pay(method) => {
                let payment = self.open_payment()?;
                let code = payment.select_method(method)?;
                Ok(format!("Scan to pay with {method}: {code}\nThen type 'paid'"))
            }
            Command::Paid(proof) => {
                let api = self.api.clone();
                let payment = self.open_payment()?;
                payment.set_payment_proof(proof);
                let order = payment.confirm_paid(api.as_ref()).await?;
                Ok(format!(
                    "Order {} submitted (#{}), pending administrator review.\n\
                     Your balance updates after approval; use 'watch {}' to wait for it.",
                    order.order_no, order.id, order.id
                ))
            }
            Command::Close => match self.payment.take() {
                Some(payment) => match payment.close() {
                    Some(order) => Ok(format!(
                        "Closed. Order {} stays pending review.",
                        order.order_no
                    )),
                    None => Ok("Closed".to_string()),
                },
                None => Ok("No payment session open".to_string()),
            },
            Command::Orders => {
                let orders = self.api.my_orders().await?;
                if orders.is_empty() {
                    return Ok("No recharge orders".to_string());
                }
                Ok(orders
                    .iter()
                    .map(describe_order)
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Command::Watch(order_id) => {
                let watcher = OrderWatcher::new(self.api.clone(), self.session.clone())
                    .with_interval(self.poll_interval);
                let order = watcher.wait_for_decision(order_id).await?;
                let mut out = describe_order(&order);
                if let Some(user) = self.session.current() {
                    let _ = write!(out, "\nBalance: {} points", user.points());
                }
                Ok(out)
            }
            Command::View(resource_id) => {
                let view = self.api.get_resource(resource_id).await?;
                Ok(self.describe_resource(&view))
            }
            Command::Buy(resource_id) => {
                let view = self.api.get_resource(resource_id).await?;
                self.last_purchase.begin()?;
                let result = self.purchases.purchase(&view.resource).await;
                self.last_purchase.finish(result.clone());
                Ok(match result? {
                    PurchaseOutcome::Charged { balance, message } => {
                        format!("{message}. Balance: {balance} points")
                    }
                    PurchaseOutcome::AlreadyUnlocked => "Already unlocked, nothing charged".to_string(),
                    PurchaseOutcome::Free => "This resource is free".to_string(),
                    PurchaseOutcome::Privileged => "Administrators read without paying".to_string(),
                })
            }
            Command::Publish {
                points,
                title,
                content,
            } => {
                let resource = self
                    .api
                    .create_resource(&NewResource {
                        title,
                        description: String::new(),
                        content,
                        is_free: points == 0,
                        points_required: points,
                    })
                    .await?;
                Ok(format!("Published resource #{}", resource.id))
            }
            Command::Review {
                order_id,
                status,
                note,
            } => {
                let order = self
                    .api
                    .review_order(
                        order_id,
                        &OrderReview {
                            status,
                            admin_note: note,
                        },
                    )
                    .await?;
                Ok(describe_order(&order))
            }
            Command::Adjust {
                user_id,
                amount,
                description,
            } => {
                let entry = self
                    .api
                    .admin_adjust(
                        user_id,
                        &AdjustRequest {
                            transaction_type: TransactionType::AdminAdjust,
                            amount,
                            description,
                            reference_id: None,
                        },
                    )
                    .await?;
                Ok(format!(
                    "User #{} adjusted by {:+}, balance now {}",
                    entry.user_id, entry.amount, entry.balance_after
                ))
            }
        }
    }

    fn open_payment(&mut self) -> ClientResult<&mut PaymentSession> {
        self.payment
            .as_mut()
            .ok_or_else(|| ClientError::NotFound("no payment session; use 'recharge PLAN'".to_string()))
    }

    async fn signed_in(&self, auth: AuthResponse) -> ClientResult<String> {
        if let Some(store) = &self.tokens {
            store.save(&StoredToken {
                access_token: auth.access_token.clone(),
                username: auth.user.username.clone(),
                expires_at: auth.expires_at,
            })?;
        }
        let user = self.session.refresh(self.api.as_ref()).await?;
        Ok(format!(
            "Logged in as {}. Balance: {} points",
            user.user.username,
            user.points()
        ))
    }

    fn forget_session(&mut self) -> ClientResult<()> {
        self.session.clear();
        self.payment = None;
        match &self.tokens {
            Some(store) => store.clear(),
            None => Ok(()),
        }
    }

    fn describe_resource(&self, view: &ResourceView) -> String {
        let resource = &view.resource;
        let price = if resource.is_free {
            "free".to_string()
        } else {
            format!("{} points", resource.points_required)
        };
        let mut out = format!("#{} {} ({})", resource.id, resource.title, price);
        if !resource.description.is_empty() {
            let _ = write!(out, "\n{}", resource.description);
        }
        match &resource.content {
            Some(content) => {
                let _ = write!(out, "\n\n{content}");
            }
            None => {
                let balance = self
                    .session
                    .current()
                    .map(|u| format!("you have {} points", u.points()))
                    .unwrap_or_else(|| "log in to purchase".to_string());
                let _ = write!(out, "\n\n[locked: {balance}; 'buy {}' to unlock]", resource.id);
            }
        }
        out
    }
}

fn describe_payment(payment: &PaymentSession) -> String {
    let plan = payment.plan();
    let mut out = format!(
        "{}: {} points for {}",
        plan.name, plan.points, plan.price
    );
    match payment.phase() {
        PaymentPhase::AwaitingPayment { method } => {
            let code = payment.qr_code().unwrap_or_default();
            let _ = write!(out, "\nScan to pay with {method}: {code}\nThen type 'paid'");
        }
        PaymentPhase::ChoosingMethod => {
            let methods: Vec<String> = payment.methods().iter().map(|m| m.to_string()).collect();
            let _ = write!(out, "\nChoose a payment method: pay {}", methods.join("|"));
        }
        PaymentPhase::Submitted(order) => {
            let _ = write!(out, "\nOrder {} pending review", order.order_no);
        }
    }
    out
}

fn describe_order(order: &RechargeOrder) -> String {
    let mut out = format!(
        "#{} {} {} {} points via {} ({})",
        order.id,
        order.order_no,
        order.status,
        order.points,
        order.payment_method,
        order.created_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(note) = &order.admin_note {
        let _ = write!(out, "\n  note: {note}");
    }
    out
}
