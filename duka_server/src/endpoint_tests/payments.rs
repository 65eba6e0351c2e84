use actix_web::{http::StatusCode, test::TestRequest};
use duka_engine::{
    db_types::{OrderStatusType, PaymentOutcome, PaymentStatusType},
    traits::ProviderStatus,
    ProviderError,
};
use serde_json::json;

use super::{
    helpers::{
        get_request,
        json,
        order_flow,
        place_paid_order,
        post_request,
        prepare_test_db,
        send,
        stock_warehouse,
        tear_down,
    },
    mocks::{accepting_provider, idle_provider, MockProvider},
};
use crate::config::ServerConfig;

fn completed_status(receipt: &str) -> ProviderStatus {
    ProviderStatus {
        outcome: PaymentOutcome::Success,
        result_code: Some(0),
        result_desc: Some("The service request is processed successfully.".to_string()),
        receipt_number: Some(receipt.to_string()),
        raw: r#"{"ResultCode":"0","ResultDesc":"The service request is processed successfully."}"#.to_string(),
    }
}

fn unreachable_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider
        .expect_initiate_payment()
        .times(1)
        .returning(|_| Err(ProviderError::Unavailable("connection refused".to_string())));
    provider
}

#[actix_web::test]
async fn payment_status_polls_processing_transactions() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-P0000001", 1, accepting_provider("ws_CO_P001")).await;

    let mut provider = MockProvider::new();
    provider
        .expect_query_payment_status()
        .withf(|cid| cid.to_string() == "ws_CO_P001")
        .times(1)
        .returning(|_| Ok(completed_status("QAB12CD34E")));
    let (status, body) = get_request(&db, provider, "/api/payments/ws_CO_P001").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let tx = json(&body);
    assert_eq!(tx["status"], "completed");
    assert_eq!(tx["receipt_number"], "QAB12CD34E");
    let order = order_flow(&db).fetch_order(&"DK-P0000001".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Confirmed);

    // Settled transactions are answered from the database
    let (status, body) = get_request(&db, idle_provider(), "/api/payments/ws_CO_P001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "completed");
    tear_down(db).await;
}

#[actix_web::test]
async fn payment_status_falls_back_to_last_known_state() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-P0000002", 1, accepting_provider("ws_CO_P002")).await;

    let mut provider = MockProvider::new();
    provider
        .expect_query_payment_status()
        .times(1)
        .returning(|_| Err(ProviderError::Unavailable("503 Service Unavailable".to_string())));
    let (status, body) = get_request(&db, provider, "/api/payments/ws_CO_P002").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["status"], "processing");

    let (status, _) = get_request(&db, idle_provider(), "/api/payments/ws_CO_NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    tear_down(db).await;
}

#[actix_web::test]
async fn retry_links_to_the_failed_attempt() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let checkout = place_paid_order(&db, "DK-P0000003", 2, unreachable_provider()).await;
    assert!(checkout["transaction"].is_null());

    let body = json!({ "payer_reference": "0722000111" });
    let path = "/api/orders/DK-P0000003/payments";
    let (status, body) = post_request(&db, accepting_provider("ws_CO_P003"), path, body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let tx = json(&body);
    assert_eq!(tx["status"], "processing");
    assert_eq!(tx["retry_count"], 1);
    assert_eq!(tx["payer_reference"], "0722000111");
    assert!(tx["parent_id"].is_i64());

    // One attempt at a time
    let (status, body) = post_request(&db, idle_provider(), path, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    tear_down(db).await;
}

#[actix_web::test]
async fn rejected_retry_is_a_bad_gateway() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-P0000004", 1, unreachable_provider()).await;

    let mut provider = MockProvider::new();
    provider.expect_initiate_payment().times(1).returning(|_| {
        Err(ProviderError::Rejected { code: "400.002.02".to_string(), message: "Invalid PhoneNumber".to_string() })
    });
    let body = json!({ "payer_reference": "0700" });
    let (status, body) = post_request(&db, provider, "/api/orders/DK-P0000004/payments", body).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    // A failed initiation leaves the order open
    let order = order_flow(&db).fetch_order(&"DK-P0000004".into()).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    tear_down(db).await;
}

#[actix_web::test]
async fn reversal_refunds_a_paid_order() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    place_paid_order(&db, "DK-P0000005", 1, accepting_provider("ws_CO_P005")).await;
    let mut provider = MockProvider::new();
    provider.expect_query_payment_status().times(1).returning(|_| Ok(completed_status("QAB12CD99Z")));
    let (status, _) = get_request(&db, provider, "/api/payments/ws_CO_P005").await;
    assert_eq!(status, StatusCode::OK);

    let mut provider = MockProvider::new();
    provider
        .expect_reverse_payment()
        .withf(|receipt, _, reason| {
            receipt.to_string() == "QAB12CD99Z" && reason.to_string() == "Out of stock at dispatch"
        })
        .times(1)
        .returning(|_, _, _| Ok("AG_20191219_00004e48cf7e3533f581".to_string()));
    let req = TestRequest::post()
        .uri("/api/orders/DK-P0000005/reversal")
        .set_json(json!({ "reason": "Out of stock at dispatch" }));
    let (status, body) = send(&db, provider, &ServerConfig::default(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["status"], "reversed");
    let order = order_flow(&db).fetch_order(&"DK-P0000005".into()).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatusType::Refunded);
    assert_eq!(order.status, OrderStatusType::Confirmed);

    // Nothing is left to reverse
    let req = TestRequest::post().uri("/api/orders/DK-P0000005/reversal").set_json(json!({ "reason": "again" }));
    let (status, _) = send(&db, idle_provider(), &ServerConfig::default(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    tear_down(db).await;
}
