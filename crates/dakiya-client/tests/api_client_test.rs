// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client tests against a mock server.

use dakiya_client::{ApiClient, ClientError, SyncHandler};
use dakiya_wire::SaleItem;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sale_body(id: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "ownerId": "9000000001",
        "items": [{"name": "Tomato", "quantity": "250g", "price": 10.0}],
        "total": 10.0,
        "isUrgent": false,
        "paymentStatus": "UNPAID",
        "createdAt": "2025-06-01T08:30:00Z"
    })
}

#[tokio::test]
async fn test_record_sale_posts_draft_with_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/driver/sales"))
        .and(header("x-participant-id", "driver-7"))
        .and(body_partial_json(serde_json::json!({
            "ownerId": "9000000001",
            "total": 10.0,
            "isUrgent": false
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(sale_body(12)))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), "driver-7").unwrap();
    let items = vec![SaleItem {
        name: "Tomato".to_string(),
        quantity: "250g".to_string(),
        price: 10.0,
    }];

    client
        .record_sale("9000000001", &items, 10.0, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mark_paid_cash_hits_the_sale_route() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/driver/sales/42/mark-paid-cash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sale_body(42)))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), "driver-7").unwrap();
    client.mark_paid_cash(42).await.unwrap();
}

#[tokio::test]
async fn test_server_error_body_maps_to_code_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/driver/sales"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "error": {"code": "ITEM_UNAVAILABLE", "message": "item 'Okra' is unknown or no longer available"}
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), "driver-7").unwrap();
    let err = client.record_sale("9000000001", &[], 0.0, false).await.unwrap_err();

    match err {
        ClientError::Server { code, message } => {
            assert_eq!(code, "ITEM_UNAVAILABLE");
            assert!(message.contains("Okra"));
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unstructured_error_keeps_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/driver/sales"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), "driver-7").unwrap();
    let err = client.record_sale("9000000001", &[], 0.0, false).await.unwrap_err();

    match err {
        ClientError::Server { code, .. } => assert_eq!(code, "HTTP_502"),
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_push() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/subscribe"))
        .and(body_partial_json(serde_json::json!({"endpoint": "https://push/dev"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/unsubscribe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"removed": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), "driver-7").unwrap();
    client
        .subscribe_push("https://push/dev", &serde_json::json!({"auth": "k"}))
        .await
        .unwrap();
    client.unsubscribe_push("https://push/dev").await.unwrap();
}
