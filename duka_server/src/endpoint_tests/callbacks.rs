use actix_web::{http::StatusCode, test::TestRequest};
use duka_engine::{
    db_types::{CallbackOutcome, OrderStatusType, PaymentStatusType},
    CallbackStore,
};
use serde_json::json;

use super::{
    helpers::{json, ledger, order_flow, place_paid_order, prepare_test_db, send, stock_warehouse, tear_down},
    mocks::{accepting_provider, idle_provider},
};
use crate::config::{configure_whitelist, ServerConfig};

fn stk_callback(correlation_id: &str, result_code: i64, desc: &str, amount: i64) -> String {
    if result_code != 0 {
        return json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": correlation_id,
                "ResultCode": result_code,
                "ResultDesc": desc
            }}
        })
        .to_string();
    }
    json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": correlation_id,
            "ResultCode": 0,
            "ResultDesc": desc,
            "CallbackMetadata": { "Item": [
                { "Name": "Amount", "Value": amount },
                { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                { "Name": "TransactionDate", "Value": 20191219102115_i64 },
                { "Name": "PhoneNumber", "Value": 254712345678_i64 }
            ]}
        }}
    })
    .to_string()
}

fn notification(path: &str, payload: &str) -> TestRequest {
    TestRequest::post().uri(path).insert_header(("Content-Type", "application/json")).set_payload(payload.to_string())
}

fn assert_acknowledged(status: StatusCode, body: &str) {
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(body), json!({ "resultCode": 0, "resultDesc": "Accepted" }));
}

#[actix_web::test]
async fn successful_callback_confirms_the_order() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-C0000001", 2, accepting_provider("ws_CO_C001")).await;
    let config = ServerConfig::default();

    let payload = stk_callback("ws_CO_C001", 0, "The service request is processed successfully.", 900);
    let (status, body) = send(&db, idle_provider(), &config, notification("/mpesa/callback", &payload)).await;
    assert_acknowledged(status, &body);

    let order = order_flow(&db).fetch_order(&"DK-C0000001".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Confirmed);
    assert_eq!(order.payment_status, PaymentStatusType::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some("NLJ7RT61SV"));

    // A redelivery is acknowledged and changes nothing
    let (status, body) = send(&db, idle_provider(), &config, notification("/mpesa/callback", &payload)).await;
    assert_acknowledged(status, &body);
    let entries = db.fetch_callbacks("ws_CO_C001").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, CallbackOutcome::Applied);
    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 2);
    tear_down(db).await;
}

#[actix_web::test]
async fn cancelled_stk_push_cancels_the_order() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-C0000002", 4, accepting_provider("ws_CO_C002")).await;

    let payload = stk_callback("ws_CO_C002", 1032, "Request cancelled by user", 0);
    let req = notification("/mpesa/callback", &payload);
    let (status, body) = send(&db, idle_provider(), &ServerConfig::default(), req).await;
    assert_acknowledged(status, &body);

    let order = order_flow(&db).fetch_order(&"DK-C0000002".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(order.payment_status, PaymentStatusType::Failed);
    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.reserved, 0);
    assert_eq!(record.quantity, 10);
    tear_down(db).await;
}

#[actix_web::test]
async fn timeout_notice_settles_the_transaction() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-C0000003", 1, accepting_provider("ws_CO_C003")).await;

    let payload = json!({ "CheckoutRequestID": "ws_CO_C003" }).to_string();
    let req = notification("/mpesa/timeout", &payload);
    let (status, body) = send(&db, idle_provider(), &ServerConfig::default(), req).await;
    assert_acknowledged(status, &body);

    let req = TestRequest::get().uri("/api/payments/ws_CO_C003");
    let (status, body) = send(&db, idle_provider(), &ServerConfig::default(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["status"], "timeout");
    tear_down(db).await;
}

#[actix_web::test]
async fn malformed_and_unmatched_notifications_are_kept() {
    let db = prepare_test_db().await;
    let config = ServerConfig::default();
    let (status, body) = send(&db, idle_provider(), &config, notification("/mpesa/callback", "{ not json")).await;
    assert_acknowledged(status, &body);

    let payload = stk_callback("ws_CO_UNKNOWN", 0, "The service request is processed successfully.", 100);
    let (status, body) = send(&db, idle_provider(), &config, notification("/mpesa/callback", &payload)).await;
    assert_acknowledged(status, &body);

    let unresolved = db.fetch_unresolved_callbacks().await.unwrap();
    assert_eq!(unresolved.len(), 2);
    let malformed = unresolved.iter().find(|e| e.outcome == CallbackOutcome::Malformed).unwrap();
    assert_eq!(malformed.raw_payload, "{ not json");
    assert!(malformed.error.is_some());
    let unmatched = unresolved.iter().find(|e| e.outcome == CallbackOutcome::Unmatched).unwrap();
    assert_eq!(unmatched.correlation_id.as_deref(), Some("ws_CO_UNKNOWN"));
    assert_eq!(unmatched.raw_payload, payload);
    tear_down(db).await;
}

#[actix_web::test]
async fn callbacks_from_unlisted_peers_are_forbidden() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-C0000004", 1, accepting_provider("ws_CO_C004")).await;
    let whitelist = configure_whitelist(Some("196.201.214.200".into()));
    let config = ServerConfig { callback_whitelist: whitelist, ..Default::default() };
    let payload = stk_callback("ws_CO_C004", 0, "The service request is processed successfully.", 450);

    let req = notification("/mpesa/callback", &payload).peer_addr("10.0.0.7:40000".parse().unwrap());
    let (status, _) = send(&db, idle_provider(), &config, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let order = order_flow(&db).fetch_order(&"DK-C0000004".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);

    let req = notification("/mpesa/callback", &payload).peer_addr("196.201.214.200:40000".parse().unwrap());
    let (status, body) = send(&db, idle_provider(), &config, req).await;
    assert_acknowledged(status, &body);
    let order = order_flow(&db).fetch_order(&"DK-C0000004".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Confirmed);
    tear_down(db).await;
}
