use actix_web::http::StatusCode;
use serde_json::json;

use super::{
    helpers::{get_request, json, ledger, post_request, prepare_test_db, stock_warehouse, tear_down},
    mocks::idle_provider,
};

#[actix_web::test]
async fn warehouses_can_be_registered_and_listed() {
    let db = prepare_test_db().await;
    let body = json!({ "code": "NBO", "name": "Nairobi Central", "priority": 10 });
    let (status, body) = post_request(&db, idle_provider(), "/api/warehouses", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["is_active"], true);
    let body = json!({ "code": "MSA", "name": "Mombasa", "priority": 5, "is_active": false });
    let (status, _) = post_request(&db, idle_provider(), "/api/warehouses", body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_request(&db, idle_provider(), "/api/warehouses").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let warehouses = json(&body);
    let codes = warehouses.as_array().unwrap().iter().map(|w| w["code"].as_str().unwrap()).collect::<Vec<_>>();
    assert_eq!(codes.len(), 2);
    assert!(codes.contains(&"NBO"));
    assert!(codes.contains(&"MSA"));
    tear_down(db).await;
}

#[actix_web::test]
async fn manual_adjustments_move_stock() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let body = json!({ "warehouse": "NBO", "sku": "TEA-500G", "delta": 2, "cause": "damaged", "notes": "Crushed" });
    let (status, body) = post_request(&db, idle_provider(), "/api/stock/adjust", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let record = json(&body);
    assert_eq!(record["quantity"], 10);
    assert_eq!(record["damaged"], 2);

    let body = json!({ "warehouse": "NBO", "sku": "TEA-500G", "delta": -50, "cause": "adjustment" });
    let (status, body) = post_request(&db, idle_provider(), "/api/stock/adjust", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    // Reservation causes are reserved for the engine
    let body = json!({ "warehouse": "NBO", "sku": "TEA-500G", "delta": -1, "cause": "reservation_fulfilled" });
    let (status, _) = post_request(&db, idle_provider(), "/api/stock/adjust", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert_eq!(record.quantity, 10);
    assert_eq!(record.available(), 8);
    tear_down(db).await;
}

#[actix_web::test]
async fn transfers_report_both_sides() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    stock_warehouse(&db, "MSA", 5, "TEA-500G", 1).await;
    let body = json!({ "from": "NBO", "to": "MSA", "sku": "TEA-500G", "quantity": 4 });
    let (status, body) = post_request(&db, idle_provider(), "/api/stock/transfer", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result = json(&body);
    assert_eq!(result["from"]["quantity"], 6);
    assert_eq!(result["to"]["quantity"], 5);

    let (status, body) = get_request(&db, idle_provider(), "/api/stock/TEA-500G").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let levels = json(&body);
    let total: i64 = levels.as_array().unwrap().iter().map(|l| l["quantity"].as_i64().unwrap()).sum();
    assert_eq!(total, 11);

    let body = json!({ "from": "NBO", "to": "MSA", "sku": "TEA-500G", "quantity": 7 });
    let (status, body) = post_request(&db, idle_provider(), "/api/stock/transfer", body).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    tear_down(db).await;
}

#[actix_web::test]
async fn reorder_points_are_stored() {
    let db = prepare_test_db().await;
    stock_warehouse(&db, "NBO", 10, "TEA-500G", 10).await;
    let body = json!({ "warehouse": "NBO", "sku": "TEA-500G", "reorder_point": 12 });
    let (status, body) = post_request(&db, idle_provider(), "/api/stock/reorder_point", body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["reorder_point"], 12);
    let record = ledger(&db).stock_record(&"NBO".into(), &"TEA-500G".into()).await.unwrap().unwrap();
    assert!(record.needs_reorder());
    tear_down(db).await;
}
