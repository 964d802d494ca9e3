mod common;

use axum::{
    body::{self, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use common::spawn;
use ridechat::{accounts::AccountType, app};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(router: &Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.unwrap()
}

async fn json_body(res: Response<Body>) -> Value {
    let bytes = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_message(peer: i64, token: &str, body: Value) -> Request<Body> {
    Request::post(format!("/api/chat/{peer}/messages"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_success() {
    let server = spawn().await;
    let router = app(server.state.clone());
    let res = send(&router, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({ "status": "success" }));
}

#[tokio::test]
async fn history_requires_authentication() {
    let server = spawn().await;
    let router = app(server.state.clone());
    let driver = server.user("dan@example.com", "Dan Driver", AccountType::Driver).await;

    let res = send(
        &router,
        Request::get(format!("/api/chat/{}/messages", driver.account.id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = send(
        &router,
        Request::get(format!("/api/chat/{}/messages", driver.account.id))
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn posting_requires_text_and_a_real_peer() {
    let server = spawn().await;
    let router = app(server.state.clone());
    let rider = server.user("rita@example.com", "Rita Rider", AccountType::User).await;
    let driver = server.user("dan@example.com", "Dan Driver", AccountType::Driver).await;

    let res = send(&router, post_message(driver.account.id, &rider.token, json!({}))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await, json!({ "error": "Message is required" }));

    let empty = post_message(driver.account.id, &rider.token, json!({ "message": "" }));
    let res = send(&router, empty).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = send(&router, post_message(9999, &rider.token, json!({ "message": "hello?" }))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_rejects_padded_peer_ids() {
    let server = spawn().await;
    let router = app(server.state.clone());
    let rider = server.user("rita@example.com", "Rita Rider", AccountType::User).await;
    let driver = server.user("dan@example.com", "Dan Driver", AccountType::Driver).await;

    for peer in [format!("+{}", driver.account.id), format!("%20{}%20", driver.account.id)] {
        let res = send(
            &router,
            Request::get(format!("/api/chat/{peer}/messages"))
                .header(header::AUTHORIZATION, format!("Bearer {}", rider.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "peer {peer}");
    }
}

#[tokio::test]
async fn posted_message_is_serialised_with_both_parties() {
    let server = spawn().await;
    let router = app(server.state.clone());
    let rider = server.user("rita@example.com", "Rita Rider", AccountType::User).await;
    let driver = server.user("dan@example.com", "Dan Driver", AccountType::Driver).await;

    let res = send(
        &router,
        post_message(driver.account.id, &rider.token, json!({ "message": "running late" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = json_body(res).await;
    assert_eq!(body["message"], "running late");
    assert_eq!(body["is_read"], false);
    assert_eq!(
        body["sender"],
        json!({
            "id": rider.account.id,
            "contact": "rita@example.com",
            "account_type": "user",
            "full_name": "Rita Rider",
        })
    );
    assert_eq!(body["receiver"]["account_type"], "driver");
    assert!(body["timestamp"].is_string());

    let res = send(
        &router,
        Request::get(format!("/api/chat/{}/messages", rider.account.id))
            .header(header::AUTHORIZATION, format!("Bearer {}", driver.token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let history = json_body(res).await;
    assert_eq!(history, json!([body]));
}

#[tokio::test]
async fn lockin_turns_a_token_into_a_cookie_session() {
    let server = spawn().await;
    let router = app(server.state.clone());
    let rider = server.user("rita@example.com", "Rita Rider", AccountType::User).await;
    let driver = server.user("dan@example.com", "Dan Driver", AccountType::Driver).await;

    let res = send(
        &router,
        Request::post("/lockin")
            .header(header::AUTHORIZATION, format!("Bearer {}", rider.token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_owned();
    assert_eq!(json_body(res).await["id"], rider.account.id);

    let res = send(
        &router,
        Request::get(format!("/api/chat/{}/messages", driver.account.id))
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(
        &router,
        Request::post("/logout")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = send(
        &router,
        Request::get(format!("/api/chat/{}/messages", driver.account.id))
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
