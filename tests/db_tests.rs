//! Router and service tests against a real Postgres.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test --test db_tests`.
//! Without it every test returns early.

mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use tokio::task::JoinSet;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use subscription_storefront::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthUser,
    models::order::OrderStatus,
    services::order_service,
};

use common::{
    ADMIN_TOKEN, CUSTOMER_TOKEN, OrderFixture, body_json, insert_commissioner, insert_inventory,
    insert_order, insert_product, mails_containing, mount_paypal_token, order_status, paypal_calls,
    paypal_id, post_json, setup_db_app,
};

const SUBSCRIPTION_READY_SUBJECT: &str = "اشتراكك جاهز";

async fn insert_trial_code(pool: &DbPool, product_id: Uuid, max_uses: i32) -> String {
    let code = Uuid::new_v4().simple().to_string()[..10].to_uppercase();
    sqlx::query(
        "INSERT INTO trial_codes (code, product_id, duration_days, max_uses) VALUES ($1, $2, 7, $3)",
    )
    .bind(&code)
    .bind(product_id)
    .bind(max_uses)
    .execute(pool)
    .await
    .unwrap();
    code
}

async fn commission_rows(pool: &DbPool, order_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM commissions WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn usage_count(pool: &DbPool, commissioner_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT usage_count FROM commissioners WHERE id = $1")
        .bind(commissioner_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn mount_capture_completed(app: &common::TestApp, paypal_order_id: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/v2/checkout/orders/{paypal_order_id}/capture")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": paypal_order_id,
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": {"captures": [{"id": "3C679366HH908993F", "status": "COMPLETED"}]}
            }]
        })))
        .expect(calls)
        .mount(&app.paypal)
        .await;
}

#[tokio::test]
async fn capture_refuses_rejected_order_without_calling_paypal() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 2000).await;
    let paypal_order = paypal_id();
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 2000,
            status: "rejected",
            paypal_order_id: Some(paypal_order.clone()),
            commissioner_id: None,
        },
    )
    .await;
    mount_paypal_token(&app.paypal).await;
    mount_capture_completed(&app, &paypal_order, 0).await;

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/checkout/paypal/capture",
            Some(CUSTOMER_TOKEN),
            json!({ "order_id": order_id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_transition");
    assert_eq!(paypal_calls(&app.paypal, "/capture").await, 0);
    assert_eq!(order_status(&app.pool, order_id).await, "rejected");
}

#[tokio::test]
async fn capture_pays_once_and_repeats_idempotently() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 2000).await;
    insert_inventory(&app.pool, product, 1).await;
    let (commissioner, _) = insert_commissioner(&app.pool, 1000, 0).await;
    let paypal_order = paypal_id();
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 2000,
            status: "pending",
            paypal_order_id: Some(paypal_order.clone()),
            commissioner_id: Some(commissioner),
        },
    )
    .await;
    mount_paypal_token(&app.paypal).await;
    mount_capture_completed(&app, &paypal_order, 1).await;

    let capture = || {
        post_json(
            "/api/checkout/paypal/capture",
            Some(CUSTOMER_TOKEN),
            json!({ "order_id": order_id }),
        )
    };

    let first = app.router.clone().oneshot(capture()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["order"]["status"], "paid");
    assert!(first["subscription"]["credential"].is_string());

    let second = app.router.clone().oneshot(capture()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["subscription"]["id"], first["subscription"]["id"]);
    assert!(second.get("message").is_none());

    assert_eq!(paypal_calls(&app.paypal, "/capture").await, 1);
    assert_eq!(commission_rows(&app.pool, order_id).await, 1);
    assert_eq!(usage_count(&app.pool, commissioner).await, 1);

    let amount: i64 = sqlx::query_scalar("SELECT amount_cents FROM commissions WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(amount, 200);
}

#[tokio::test]
async fn capture_accepts_order_already_captured_at_paypal() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1500).await;
    insert_inventory(&app.pool, product, 1).await;
    let paypal_order = paypal_id();
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 1500,
            status: "pending",
            paypal_order_id: Some(paypal_order.clone()),
            commissioner_id: None,
        },
    )
    .await;
    mount_paypal_token(&app.paypal).await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/checkout/orders/{paypal_order}/capture")))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY",
            "details": [{"issue": "ORDER_ALREADY_CAPTURED"}]
        })))
        .mount(&app.paypal)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/checkout/orders/{paypal_order}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": paypal_order,
            "status": "COMPLETED"
        })))
        .mount(&app.paypal)
        .await;

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/checkout/paypal/capture",
            Some(CUSTOMER_TOKEN),
            json!({ "order_id": order_id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["order"]["status"], "paid");
    assert_eq!(order_status(&app.pool, order_id).await, "paid");
}

#[tokio::test]
async fn capture_of_approved_order_does_not_resend_credential() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 2000).await;
    insert_inventory(&app.pool, product, 1).await;
    let paypal_order = paypal_id();
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 2000,
            status: "pending",
            paypal_order_id: Some(paypal_order.clone()),
            commissioner_id: None,
        },
    )
    .await;
    mount_paypal_token(&app.paypal).await;
    mount_capture_completed(&app, &paypal_order, 1).await;

    let approved = app
        .router
        .clone()
        .oneshot(post_json(
            &format!("/api/admin/orders/{order_id}/approve"),
            Some(ADMIN_TOKEN),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    let approved = body_json(approved).await;
    assert_eq!(approved["order"]["status"], "approved");
    assert_eq!(mails_containing(&app.mail, SUBSCRIPTION_READY_SUBJECT).await, 1);

    let captured = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/checkout/paypal/capture",
            Some(CUSTOMER_TOKEN),
            json!({ "order_id": order_id }),
        ))
        .await
        .unwrap();
    assert_eq!(captured.status(), StatusCode::OK);
    let captured = body_json(captured).await;
    assert_eq!(captured["order"]["status"], "paid");
    assert_eq!(captured["subscription"]["id"], approved["subscription"]["id"]);

    assert_eq!(mails_containing(&app.mail, SUBSCRIPTION_READY_SUBJECT).await, 1);
}

#[tokio::test]
async fn approve_then_reject_leaves_nothing_to_pay_out() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    let (commissioner, _) = insert_commissioner(&app.pool, 1000, 0).await;
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 1000,
            status: "pending",
            paypal_order_id: None,
            commissioner_id: Some(commissioner),
        },
    )
    .await;

    let approved = app
        .router
        .clone()
        .oneshot(post_json(
            &format!("/api/admin/orders/{order_id}/approve"),
            Some(ADMIN_TOKEN),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    let approved = body_json(approved).await;
    assert!(approved["subscription"].is_null());
    assert!(approved["message"].is_string());

    let rejected = app
        .router
        .clone()
        .oneshot(post_json(
            &format!("/api/admin/orders/{order_id}/reject"),
            Some(ADMIN_TOKEN),
            json!({ "reason": "payment never arrived" }),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::OK);

    let payout = app
        .router
        .clone()
        .oneshot(post_json(
            &format!("/api/admin/commissioners/{commissioner}/payout"),
            Some(ADMIN_TOKEN),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(payout.status(), StatusCode::OK);
    let payout = body_json(payout).await;
    assert_eq!(payout["commissions"], 0);
    assert_eq!(payout["amount_cents"], 0);

    assert_eq!(commission_rows(&app.pool, order_id).await, 0);
    assert_eq!(usage_count(&app.pool, commissioner).await, 0);
}

#[tokio::test]
async fn approval_with_empty_pool_stays_approved_until_restock() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 1000,
            status: "pending",
            paypal_order_id: None,
            commissioner_id: None,
        },
    )
    .await;
    let assign_uri = format!("/api/admin/orders/{order_id}/assign");

    let approved = app
        .router
        .clone()
        .oneshot(post_json(
            &format!("/api/admin/orders/{order_id}/approve"),
            Some(ADMIN_TOKEN),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);
    assert_eq!(order_status(&app.pool, order_id).await, "approved");

    let empty = app
        .router
        .clone()
        .oneshot(post_json(&assign_uri, Some(ADMIN_TOKEN), json!({})))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(empty).await["error"]["code"], "no_inventory");
    assert_eq!(order_status(&app.pool, order_id).await, "approved");

    insert_inventory(&app.pool, product, 1).await;

    let assigned = app
        .router
        .clone()
        .oneshot(post_json(&assign_uri, Some(ADMIN_TOKEN), json!({})))
        .await
        .unwrap();
    assert_eq!(assigned.status(), StatusCode::OK);
    assert!(body_json(assigned).await["credential"].is_string());

    let again = app
        .router
        .clone()
        .oneshot(post_json(&assign_uri, Some(ADMIN_TOKEN), json!({})))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(again).await["error"]["code"], "already_assigned");
}

#[tokio::test]
async fn zero_total_checkout_settles_without_paypal() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 2000).await;
    insert_inventory(&app.pool, product, 1).await;
    let (_, code) = insert_commissioner(&app.pool, 500, 100).await;

    let placed = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/orders",
            Some(CUSTOMER_TOKEN),
            json!({ "product_id": product, "promo_code": code.to_lowercase() }),
        ))
        .await
        .unwrap();
    assert_eq!(placed.status(), StatusCode::CREATED);
    let placed = body_json(placed).await;
    assert_eq!(placed["discount_cents"], 2000);

    let session = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/checkout/paypal/create",
            Some(CUSTOMER_TOKEN),
            json!({ "order_id": placed["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(session.status(), StatusCode::OK);
    let session = body_json(session).await;
    assert!(session["paypal_order_id"].is_null());
    assert_eq!(session["fulfillment"]["order"]["status"], "paid");
    assert!(session["fulfillment"]["subscription"]["credential"].is_string());

    assert!(app.paypal.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn concurrent_reject_and_payment_have_one_winner() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 1000,
            status: "pending",
            paypal_order_id: None,
            commissioner_id: None,
        },
    )
    .await;

    let mut tasks = JoinSet::new();
    for target in [OrderStatus::Rejected, OrderStatus::Paid] {
        let pool = app.pool.clone();
        tasks.spawn(async move { order_service::transition(&pool, order_id, target, None).await });
    }

    let mut winners = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(order) => winners.push(order.status),
            Err(AppError::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(order_status(&app.pool, order_id).await, winners[0]);
}

#[tokio::test]
async fn concurrent_approvals_only_one_succeeds() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    let order_id = insert_order(
        &app.pool,
        OrderFixture {
            user_id: app.customer_id,
            product_id: product,
            amount_cents: 1000,
            status: "pending",
            paypal_order_id: None,
            commissioner_id: None,
        },
    )
    .await;

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let pool = app.pool.clone();
        tasks.spawn(async move {
            order_service::transition(&pool, order_id, OrderStatus::Approved, None).await
        });
    }

    let mut wins = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => wins += 1,
            Err(AppError::InvalidTransition { from, .. }) => assert_eq!(from, "approved"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn concurrent_assignments_never_share_a_credential() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    let stock = insert_inventory(&app.pool, product, 3).await;

    let mut orders = Vec::new();
    for _ in 0..6 {
        orders.push(
            insert_order(
                &app.pool,
                OrderFixture {
                    user_id: Uuid::new_v4(),
                    product_id: product,
                    amount_cents: 1000,
                    status: "approved",
                    paypal_order_id: None,
                    commissioner_id: None,
                },
            )
            .await,
        );
    }

    let mut tasks = JoinSet::new();
    for order_id in orders {
        let pool = app.pool.clone();
        tasks.spawn(async move { order_service::assign_subscription(&pool, order_id).await });
    }

    let mut bound = HashSet::new();
    let mut empty = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(subscription) => assert!(bound.insert(subscription.inventory_id)),
            Err(AppError::NoInventory) => empty += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(bound.len(), 3);
    assert_eq!(empty, 3);
    assert_eq!(bound, stock.into_iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn trial_redemptions_never_exceed_max_uses() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    insert_inventory(&app.pool, product, 5).await;
    let code = insert_trial_code(&app.pool, product, 2).await;

    let mut tasks = JoinSet::new();
    for i in 0..5 {
        let pool = app.pool.clone();
        let code = code.clone();
        tasks.spawn(async move {
            let user = AuthUser {
                id: Uuid::new_v4(),
                email: format!("trial{i}@example.com"),
            };
            order_service::redeem_trial(&pool, &user, &code, Utc::now()).await
        });
    }

    let mut redeemed = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok((order, subscription)) => {
                assert_eq!(order.status, "paid");
                assert_eq!(order.payment_method, "trial");
                assert_eq!(subscription.order_id, order.id);
                redeemed += 1;
            }
            Err(AppError::InvalidRequest(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(redeemed, 2);

    let used: i32 = sqlx::query_scalar("SELECT used_count FROM trial_codes WHERE code = $1")
        .bind(&code)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(used, 2);
}

#[tokio::test]
async fn trial_with_empty_pool_leaves_code_unspent() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    let code = insert_trial_code(&app.pool, product, 1).await;
    let user = AuthUser {
        id: Uuid::new_v4(),
        email: "trial@example.com".to_string(),
    };

    let err = order_service::redeem_trial(&app.pool, &user, &code, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoInventory));

    let (used, redemptions): (i32, i64) = sqlx::query_as(
        r#"
        SELECT t.used_count, (SELECT COUNT(*) FROM trial_redemptions r WHERE r.trial_code_id = t.id)
        FROM trial_codes t
        WHERE t.code = $1
        "#,
    )
    .bind(&code)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(used, 0);
    assert_eq!(redemptions, 0);

    // Restocked: the same user can now redeem
    insert_inventory(&app.pool, product, 1).await;
    let (order, _) = order_service::redeem_trial(&app.pool, &user, &code, Utc::now())
        .await
        .unwrap();
    assert_eq!(order.status, "paid");
}

#[tokio::test]
async fn expiry_sweep_rejects_stale_orders_and_expires_subscriptions() {
    let Some(app) = setup_db_app().await else { return };
    let product = insert_product(&app.pool, 1000).await;
    insert_inventory(&app.pool, product, 1).await;

    let fixture = |status: &'static str| OrderFixture {
        user_id: app.customer_id,
        product_id: product,
        amount_cents: 1000,
        status,
        paypal_order_id: None,
        commissioner_id: None,
    };
    let stale = insert_order(&app.pool, fixture("pending")).await;
    let fresh = insert_order(&app.pool, fixture("pending")).await;
    let paid = insert_order(&app.pool, fixture("paid")).await;

    sqlx::query("UPDATE orders SET created_at = NOW() - INTERVAL '3 days' WHERE id = $1")
        .bind(stale)
        .execute(&app.pool)
        .await
        .unwrap();

    let subscription = order_service::assign_subscription(&app.pool, paid).await.unwrap();
    sqlx::query("UPDATE subscriptions SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(subscription.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let report = order_service::expire_stale(&app.pool, Utc::now(), 48).await.unwrap();
    assert!(report.rejected_orders >= 1);
    assert!(report.expired_subscriptions >= 1);

    let (status, reason): (String, Option<String>) =
        sqlx::query_as("SELECT status, rejection_reason FROM orders WHERE id = $1")
            .bind(stale)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, "rejected");
    assert_eq!(reason.as_deref(), Some("expired"));
    assert_eq!(order_status(&app.pool, fresh).await, "pending");

    let sub_status: String = sqlx::query_scalar("SELECT status FROM subscriptions WHERE id = $1")
        .bind(subscription.id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(sub_status, "expired");
}
