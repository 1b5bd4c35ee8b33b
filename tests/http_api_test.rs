mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::TestContext;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = ctx.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn requests_need_a_bearer_token() {
    let ctx = TestContext::new().await;

    let (status, body) = call(&ctx, Method::GET, "/api/v1/requests", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Unauthorized: missing bearer token");

    let (status, _) = call(
        &ctx,
        Method::GET,
        "/api/v1/requests",
        Some("not-a-jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn request_flow_over_http() {
    let ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(50)).await;
    let branch_token = ctx.token_for(&ctx.branch_admin);
    let central_token = ctx.token_for(&ctx.central);

    let (status, body) = call(
        &ctx,
        Method::POST,
        "/api/v1/requests",
        Some(&branch_token),
        Some(json!({
            "items": [{ "material_id": ctx.rice.id, "qty": "8" }],
            "notes": "menu minggu depan"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "PENDING");
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let item_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/requests/{id}/approve"),
        Some(&central_token),
        Some(json!({ "items": [{ "item_id": item_id, "qty_approved": "6" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "APPROVED");
    assert_eq!(body["message"], "Request approved");

    let (status, _) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/requests/{id}/ship"),
        Some(&branch_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/requests/{id}/ship"),
        Some(&central_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SHIPPED");

    let (status, body) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/requests/{id}/ship"),
        Some(&central_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (status, body) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/requests/{id}/receive"),
        Some(&branch_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "RECEIVED");
    assert_eq!(ctx.stock_qty(ctx.rice.id, ctx.branch.id).await, Some(dec!(6)));

    let (status, body) = call(
        &ctx,
        Method::GET,
        "/api/v1/requests?status=RECEIVED&limit=5",
        Some(&branch_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["meta"]["limit"], 5);
    assert_eq!(body["meta"]["lastPage"], 1);
    assert_eq!(body["data"][0]["id"], id.as_str());
}

#[tokio::test]
async fn insufficient_stock_is_unprocessable() {
    let ctx = TestContext::new().await;
    let central_token = ctx.token_for(&ctx.central);
    let created = ctx.create_request(&[(ctx.oil.id, dec!(3))]).await;
    ctx.services()
        .requests
        .approve(&ctx.central, created.request.id, vec![])
        .await
        .unwrap();

    let (status, body) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/requests/{}/ship", created.request.id),
        Some(&central_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("Minyak Goreng"));
}

#[tokio::test]
async fn distribution_endpoints_validate_returns() {
    let ctx = TestContext::new().await;
    let token = ctx.token_for(&ctx.branch_admin);

    let (status, body) = call(
        &ctx,
        Method::POST,
        "/api/v1/distributions",
        Some(&token),
        Some(json!({
            "school_id": ctx.school.id,
            "courier_name": "Pak Joko",
            "container_count": 5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "DIKIRIM");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/distributions/{id}/return-containers"),
        Some(&token),
        Some(json!({ "returned_container": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/distributions/{id}/return-containers"),
        Some(&token),
        Some(json!({ "returned_container": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "WADAH_KEMBALI_SEBAGIAN");

    let (status, body) = call(
        &ctx,
        Method::GET,
        "/api/v1/distributions?status=WADAH_KEMBALI_SEBAGIAN",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
}

#[tokio::test]
async fn list_pages_beyond_range_are_bad_requests() {
    let ctx = TestContext::new().await;
    let token = ctx.token_for(&ctx.central);

    for uri in [
        "/api/v1/requests?page=18446744073709551615",
        "/api/v1/stocks?page=18446744073709551615",
        "/api/v1/distributions?page=18446744073709551615",
    ] {
        let (status, body) = call(&ctx, Method::GET, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["message"].as_str().unwrap().contains("out of range"));
    }
}

#[tokio::test]
async fn stock_endpoints_are_scoped() {
    let ctx = TestContext::new().await;
    ctx.stock_center(ctx.rice.id, dec!(10)).await;
    let token = ctx.token_for(&ctx.branch_admin);

    let (status, body) = call(&ctx, Method::GET, "/api/v1/stocks", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 0);

    let (status, _) = call(
        &ctx,
        Method::POST,
        "/api/v1/stocks/opname",
        Some(&token),
        Some(json!({
            "branch_id": ctx.center.id,
            "material_id": ctx.rice.id,
            "qty": "1",
            "reason": "recount"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_reports_database_status() {
    let ctx = TestContext::new().await;

    let (status, body) = call(&ctx, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");

    let (status, _) = call(&ctx, Method::GET, "/api/v1/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
