//! Property tests: random sequences of ledger activity never break the
//! balance invariant.

use paywall::auth::{Actor, AuthManager, RegisterRequest, UserRole};
use paywall::db::MemoryStore;
use paywall::ledger::{AdjustRequest, LedgerManager, TransactionType};
use paywall::recharge::{NewRechargeOrder, OrderReview, OrderStatus, PaymentMethod, RechargeManager};
use paywall::resources::{NewResource, ResourceManager};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Adjust(i64),
    Buy(i64),
    Recharge { points: i64, approve: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-300i64..300).prop_map(Op::Adjust),
        (1i64..200).prop_map(Op::Buy),
        (1i64..400, any::<bool>()).prop_map(|(points, approve)| Op::Recharge { points, approve }),
    ]
}

async fn run(ops: Vec<Op>) -> (i64, i64, bool) {
    let store = Arc::new(MemoryStore::new());
    let auth = AuthManager::new(store.clone(), "pepper".to_string(), "secret".to_string());
    let ledger = LedgerManager::new(store.clone());
    let resources = ResourceManager::new(store.clone(), store.clone());
    let recharge = RechargeManager::new(store);

    let user = auth
        .register(RegisterRequest {
            username: "prop_user".to_string(),
            password: "SecurePass123".to_string(),
            display_name: String::new(),
            email: None,
        })
        .await
        .unwrap();
    let user = Actor::from(&user);
    let admin = Actor::new(user.user_id, UserRole::Admin);

    let mut expected = 100;
    for op in ops {
        match op {
            Op::Adjust(amount) => {
                let request = AdjustRequest {
                    transaction_type: TransactionType::AdminAdjust,
                    amount,
                    description: "prop".to_string(),
                    reference_id: None,
                };
                if ledger.adjust(&admin, user.user_id, request).await.is_ok() {
                    expected += amount;
                }
            }
            Op::Buy(price) => {
                let resource = resources
                    .create(
                        &user,
                        NewResource {
                            title: "r".to_string(),
                            description: String::new(),
                            content: "c".to_string(),
                            is_free: false,
                            points_required: price,
                        },
                    )
                    .await
                    .unwrap();
                if resources.purchase(&user, resource.id).await.is_ok() {
                    expected -= price;
                }
            }
            Op::Recharge { points, approve } => {
                let order = recharge
                    .create_order(
                        user.user_id,
                        NewRechargeOrder {
                            plan_id: None,
                            amount: points,
                            points,
                            payment_method: PaymentMethod::Wechat,
                            payment_proof: None,
                        },
                    )
                    .await
                    .unwrap();
                let status = if approve {
                    OrderStatus::Approved
                } else {
                    OrderStatus::Rejected
                };
                recharge
                    .review_order(
                        &admin,
                        order.id,
                        OrderReview {
                            status: Some(status),
                            admin_note: Some("prop".to_string()),
                        },
                    )
                    .await
                    .unwrap();
                if approve {
                    expected += points;
                }
            }
        }
    }

    let audit = ledger.audit(user.user_id).await.unwrap();
    (audit.stored_balance, expected, audit.is_consistent())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balance_equals_ledger_sum(ops in prop::collection::vec(op(), 0..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (stored, expected, consistent) = runtime.block_on(run(ops));

        prop_assert!(consistent);
        prop_assert!(stored >= 0);
        prop_assert_eq!(stored, expected);
    }
}
