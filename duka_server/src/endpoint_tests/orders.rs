use actix_web::http::StatusCode;
use duka_engine::{
    db_types::{NewOrder, OrderId, OrderStatusType},
    CheckoutRequest,
    ProviderError,
};
use serde_json::json;

use super::{
    helpers::{get_request, json, kes, ledger, order_flow, post_request, prepare_test_db, stock_warehouse, tear_down},
    mocks::{accepting_provider, idle_provider, MockProvider},
};

#[actix_web::test]
async fn checkout_reserves_stock_and_sends_stk_push() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let order = NewOrder::new(OrderId::from("DK-E0000001"), "cust-1")
        .with_item("TEA-500G", 3, kes(450))
        .with_extra_charges(kes(216));
    let body = serde_json::to_value(CheckoutRequest { order, payer_reference: Some("0712345678".into()) }).unwrap();
    let (status, body) = post_request(&db, accepting_provider("ws_CO_E001"), "/api/checkout", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["order"]["status"], "pending");
    assert_eq!(result["order"]["payment_status"], "pending");
    assert_eq!(result["order"]["total_price"], json!(kes(1566)));
    assert_eq!(result["transaction"]["correlation_id"], "ws_CO_E001");
    assert_eq!(result["transaction"]["status"], "processing");
    assert!(result["payment_error"].is_null());

    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.quantity, 10);
    assert_eq!(record.reserved, 3);
    tear_down(db).await;
}

#[actix_web::test]
async fn storefront_checkout_uses_defaults() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let body = json!({
        "order": {
            "order_id": "DK-E0000002",
            "customer_id": "cust-2",
            "items": [{ "sku": "TEA-500G", "quantity": 2, "unit_price": 45000 }]
        }
    });
    let (status, body) = post_request(&db, idle_provider(), "/api/checkout", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["order"]["currency"], "KES");
    assert_eq!(result["order"]["total_price"], 90000);
    // No payer, so no STK push
    assert!(result["transaction"].is_null());
    tear_down(db).await;
}

#[actix_web::test]
async fn checkout_without_enough_stock_is_a_conflict() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 2).await;
    let order = NewOrder::new(OrderId::from("DK-E0000003"), "cust-1").with_item("TEA-500G", 3, kes(450));
    let body = serde_json::to_value(CheckoutRequest { order, payer_reference: Some("0712345678".into()) }).unwrap();
    let (status, body) = post_request(&db, idle_provider(), "/api/checkout", body).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(json(&body)["error"].as_str().unwrap().contains("TEA-500G"));

    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 0);
    let (status, _) = get_request(&db, idle_provider(), "/api/orders/DK-E0000003").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    tear_down(db).await;
}

#[actix_web::test]
async fn checkout_survives_an_unreachable_provider() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 5).await;
    let mut provider = MockProvider::new();
    provider
        .expect_initiate_payment()
        .times(1)
        .returning(|_| Err(ProviderError::Unavailable("connection refused".to_string())));
    let order = NewOrder::new(OrderId::from("DK-E0000004"), "cust-1").with_item("TEA-500G", 1, kes(450));
    let body = serde_json::to_value(CheckoutRequest { order, payer_reference: Some("0712345678".into()) }).unwrap();
    let (status, body) = post_request(&db, provider, "/api/checkout", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["order"]["status"], "pending");
    assert!(result["transaction"].is_null());
    assert!(result["payment_error"].as_str().unwrap().contains("connection refused"));
    // The stock stays reserved so that the payment can be retried
    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 1);
    tear_down(db).await;
}

#[actix_web::test]
async fn order_detail_includes_reservations_and_payments() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 2).await;
    stock_warehouse(&db, "MSA", 5, "TEA-500G", 2).await;
    let order = NewOrder::new(OrderId::from("DK-E0000005"), "cust-1").with_item("TEA-500G", 3, kes(450));
    let body = serde_json::to_value(CheckoutRequest { order, payer_reference: Some("0712345678".into()) }).unwrap();
    let (status, _) = post_request(&db, accepting_provider("ws_CO_E005"), "/api/checkout", body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_request(&db, idle_provider(), "/api/orders/DK-E0000005").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let detail = json(&body);
    assert_eq!(detail["order"]["order_id"], "DK-E0000005");
    assert_eq!(detail["items"].as_array().unwrap().len(), 1);
    let reservations = detail["reservations"].as_array().unwrap();
    assert_eq!(reservations.len(), 2);
    let reserved: i64 = reservations.iter().map(|r| r["quantity"].as_i64().unwrap()).sum();
    assert_eq!(reserved, 3);
    assert_eq!(detail["transactions"][0]["correlation_id"], "ws_CO_E005");
    tear_down(db).await;
}

#[actix_web::test]
async fn illegal_transitions_are_refused() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 5).await;
    let order = NewOrder::new(OrderId::from("DK-E0000006"), "cust-1").with_item("TEA-500G", 2, kes(450));
    order_flow(&db).place_order(order).await.unwrap();

    let body = json!({ "status": "shipped", "actor": "admin" });
    let (status, body) = post_request(&db, idle_provider(), "/api/orders/DK-E0000006/status", body).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    let order = order_flow(&db).fetch_order(&"DK-E0000006".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);

    let body = json!({ "status": "cancelled", "actor": "admin", "reason": "Customer changed their mind" });
    let (status, body) = post_request(&db, idle_provider(), "/api/orders/DK-E0000006/status", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["status"], "cancelled");
    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 0);
    assert_eq!(record.quantity, 5);

    let (status, body) = get_request(&db, idle_provider(), "/api/orders/DK-E0000006/history").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let history = json(&body);
    let last = history.as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["new_status"], "cancelled");
    assert_eq!(last["actor"], "admin");
    tear_down(db).await;
}

#[actix_web::test]
async fn unknown_orders_are_not_found() {
    let db = prepare_test_db().await;
    let (status, _) = get_request(&db, idle_provider(), "/api/orders/DK-NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_request(&db, idle_provider(), "/api/orders/DK-NOPE/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = json!({ "status": "cancelled", "actor": "admin" });
    let (status, _) = post_request(&db, idle_provider(), "/api/orders/DK-NOPE/status", body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    tear_down(db).await;
}
