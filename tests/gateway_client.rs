//! Gateway client behaviour against a mock New API.
//!
//! Covers session acquisition, the single retry after a rejected session,
//! response-shape normalization and the typed token/channel/log wrappers.

use std::sync::Arc;
use std::time::Duration;

use dashboard::newapi::{
    AuthError, CreateChannelParams, CreateTokenParams, GatewayError, LogFilter, NewApiClient,
    PasswordLogin, StaticToken, TokenStatus, CHANNEL_TYPE_OLLAMA,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOT_LOGGED_IN: &str = "无权进行此操作，未登录且未提供 access token";

fn client(server: &MockServer) -> NewApiClient {
    NewApiClient::new(
        server.uri(),
        Arc::new(PasswordLogin::new("admin", "secret")),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("set-cookie", "session=sess-1; Path=/; HttpOnly")
        .set_body_json(json!({
            "success": true,
            "message": "",
            "data": { "id": 1, "username": "admin", "role": 100 }
        }))
}

async fn mount_login(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .and(body_json(json!({ "username": "admin", "password": "secret" })))
        .respond_with(login_ok())
        .expect(times)
        .mount(server)
        .await;
}

fn token(id: i64) -> Value {
    json!({
        "id": id,
        "key": "",
        "name": format!("tok-{id}"),
        "status": 1,
        "used_quota": 0,
        "remain_quota": 500000,
        "created_time": 1_700_000_000,
        "expired_time": -1
    })
}

fn ok_with(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "message": "", "data": data }))
}

// ── Session acquisition ──────────────────────────────────────

#[tokio::test]
async fn test_single_login_precedes_first_request() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .and(header("cookie", "session=sess-1"))
        .and(header("new-api-user", "1"))
        .respond_with(ok_with(json!({ "items": [token(1)], "total": 1 })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.list_tokens().await.unwrap().len(), 1);
    assert_eq!(client.list_tokens().await.unwrap().len(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.path(), "/api/user/login");
    assert_eq!(requests[1].url.path(), "/api/token/");
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!([token(1)])))
        .expect(6)
        .mount(&server)
        .await;

    let client = Arc::new(client(&server));
    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.list_tokens().await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_login_rejection_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "用户名或密码错误，或用户已被封禁"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server).list_tokens().await.unwrap_err();
    assert!(
        matches!(err, GatewayError::Auth(AuthError::Rejected(ref m)) if m.contains("密码")),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_login_without_session_cookie_proceeds_without_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "id": 42 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!([token(1)])))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    client.list_tokens().await.unwrap();
    client.list_tokens().await.unwrap();

    let session = client.sessions().current().await.unwrap();
    assert!(session.credential.is_missing());
    assert_eq!(session.admin_id, 42);

    let requests = server.received_requests().await.unwrap();
    let calls: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/token/")
        .collect();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert!(call.headers.get("cookie").is_none());
        assert_eq!(call.headers.get("new-api-user").unwrap(), "42");
    }
}

// ── Retry on rejected session ────────────────────────────────

#[tokio::test]
async fn test_401_triggers_one_relogin_and_retry() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!([token(1), token(2)])))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client(&server).list_tokens().await.unwrap();
    assert_eq!(tokens.len(), 2);
}

#[tokio::test]
async fn test_second_401_surfaces_without_further_retry() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still expired"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server).list_tokens().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("still expired"));
}

#[tokio::test]
async fn test_unauthenticated_envelope_triggers_retry() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;

    Mock::given(method("DELETE"))
        .and(path("/api/token/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": NOT_LOGGED_IN
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/token/9"))
        .respond_with(ok_with(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_token(9).await.unwrap();
}

#[tokio::test]
async fn test_retry_disallowed_surfaces_first_rejection() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .perform(reqwest::Method::GET, "/api/token/?p=0&size=100", None, false)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_business_rejection_is_not_retried() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("DELETE"))
        .and(path("/api/token/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "token not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).delete_token(5).await.unwrap_err();
    assert!(matches!(err, GatewayError::Rejected(ref m) if m == "token not found"));
}

#[tokio::test]
async fn test_server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("PUT"))
        .and(path("/api/token/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .update_token_status(3, TokenStatus::Disabled)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 500, ref body } if body == "boom"));
}

// ── Bearer mode ──────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_mode_never_logs_in_or_retries() {
    let server = MockServer::start().await;
    mount_login(&server, 0).await;

    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .and(header("authorization", "Bearer sys-token"))
        .and(header("new-api-user", "1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = NewApiClient::new(
        server.uri(),
        Arc::new(StaticToken::new("sys-token", 1)),
        Duration::from_secs(5),
    )
    .unwrap();

    let err = client.list_tokens().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

// ── Tokens ───────────────────────────────────────────────────

#[tokio::test]
async fn test_create_token_applies_defaults() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/token/"))
        .and(body_json(json!({
            "name": "abcd1234_main",
            "remain_quota": 500000,
            "expired_time": -1,
            "unlimited_quota": false
        })))
        .respond_with(ok_with(json!({
            "id": 10,
            "key": "sk-secretvalue123",
            "name": "abcd1234_main",
            "status": 1,
            "remain_quota": 500000,
            "expired_time": -1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server)
        .create_token(CreateTokenParams::new("abcd1234_main"))
        .await
        .unwrap();
    assert_eq!(token.id, 10);
    assert_eq!(token.key, "sk-secretvalue123");
    assert_eq!(token.status, TokenStatus::Enabled);
}

#[tokio::test]
async fn test_list_shapes_normalize_identically() {
    let paged = MockServer::start().await;
    mount_login(&paged, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!({ "items": [token(1), token(2)], "total": 2 })))
        .mount(&paged)
        .await;

    let bare = MockServer::start().await;
    mount_login(&bare, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!([token(1), token(2)])))
        .mount(&bare)
        .await;

    let from_paged = client(&paged).list_tokens().await.unwrap();
    let from_bare = client(&bare).list_tokens().await.unwrap();
    assert_eq!(from_paged, from_bare);
    assert_eq!(from_paged.len(), 2);
}

#[tokio::test]
async fn test_list_tokens_walks_pages() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    let first: Vec<Value> = (1..=100).map(token).collect();
    let second: Vec<Value> = (101..=105).map(token).collect();
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .and(query_param("p", "0"))
        .and(query_param("size", "100"))
        .respond_with(ok_with(json!({ "items": first })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .and(query_param("p", "1"))
        .respond_with(ok_with(json!({ "items": second })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client(&server).list_tokens().await.unwrap();
    assert_eq!(tokens.len(), 105);
    assert_eq!(tokens.last().unwrap().id, 105);
}

#[tokio::test]
async fn test_list_tokens_stops_when_page_is_ignored() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    // A gateway that ignores `p` returns the same full page every time.
    let page: Vec<Value> = (1..=100).map(token).collect();
    Mock::given(method("GET"))
        .and(path("/api/token/"))
        .respond_with(ok_with(json!(page)))
        .expect(2)
        .mount(&server)
        .await;

    let tokens = client(&server).list_tokens().await.unwrap();
    assert_eq!(tokens.len(), 100);
}

#[tokio::test]
async fn test_list_tokens_reaches_reported_total_past_fifty_pages() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    for page in 0..60i64 {
        let items: Vec<Value> = (page * 100 + 1..=page * 100 + 100).map(token).collect();
        Mock::given(method("GET"))
            .and(path("/api/token/"))
            .and(query_param("p", page.to_string()))
            .respond_with(ok_with(json!({ "items": items, "total": 6000 })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let tokens = client(&server).list_tokens().await.unwrap();
    assert_eq!(tokens.len(), 6000);
    assert!(tokens.iter().any(|t| t.id == 5500));
    assert_eq!(tokens.last().unwrap().id, 6000);
}

// ── Usage logs ───────────────────────────────────────────────

#[tokio::test]
async fn test_usage_log_filters_are_additive() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/log/"))
        .and(query_param("p", "0"))
        .and(query_param("size", "1000"))
        .and(query_param("token_id", "7"))
        .and(query_param("start_timestamp", "100"))
        .and(query_param_is_missing("end_timestamp"))
        .respond_with(ok_with(json!([
            { "token_id": 7, "model_name": "llama3", "prompt_tokens": 3, "completion_tokens": 4, "created_at": 150 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let logs = client(&server)
        .get_usage_logs(LogFilter::for_token(7).since(100))
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].model_name, "llama3");
    assert_eq!(logs[0].completion_tokens, 4);
}

#[tokio::test]
async fn test_usage_logs_accept_paged_shape() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/log/"))
        .respond_with(ok_with(json!({
            "items": [{ "token_id": 1, "model_name": "m", "prompt_tokens": 1, "completion_tokens": 1, "created_at": 1 }],
            "total": 1
        })))
        .mount(&server)
        .await;

    let logs = client(&server).get_usage_logs(LogFilter::default()).await.unwrap();
    assert_eq!(logs.len(), 1);
}

// ── Channels ─────────────────────────────────────────────────

#[tokio::test]
async fn test_create_channel_returns_id() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/channel/"))
        .and(body_json(json!({
            "name": "ollama_abcd1234_home",
            "type": 2,
            "key": "ollama",
            "base_url": "http://10.0.0.2:11434",
            "models": "llama3,qwen2",
            "group": "default"
        })))
        .respond_with(ok_with(json!({ "id": 33 })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server)
        .create_channel(CreateChannelParams {
            name: "ollama_abcd1234_home".into(),
            channel_type: CHANNEL_TYPE_OLLAMA,
            key: "ollama".into(),
            base_url: "http://10.0.0.2:11434".into(),
            models: "llama3,qwen2".into(),
            group: None,
        })
        .await
        .unwrap();
    assert_eq!(id, Some(33));
}

#[tokio::test]
async fn test_channel_test_maps_failures_to_false() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/channel/test/1"))
        .respond_with(ok_with(json!({ "time": 0.42 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/channel/test/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/channel/test/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "upstream timed out"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.test_channel(1).await);
    assert!(!client.test_channel(2).await);
    assert!(!client.test_channel(3).await);
}

#[tokio::test]
async fn test_channel_test_unreachable_gateway_is_false() {
    let client = NewApiClient::new(
        "http://127.0.0.1:1",
        Arc::new(PasswordLogin::new("admin", "secret")),
        Duration::from_millis(500),
    )
    .unwrap();
    assert!(!client.test_channel(1).await);
}
