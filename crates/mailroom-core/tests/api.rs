use std::sync::Arc;

use mailroom_core::api::ApiClient;
use mailroom_core::config::ApiConfig;
use mailroom_core::error::{ApiErrorCode, Error};
use mailroom_core::orchestrator::JobApi;
use mailroom_core::token_store::{MemoryTokenStore, TokenStore};
use mailroom_core::{LoginRequest, Tokens};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tokens(access: &str) -> Tokens {
    Tokens {
        access: access.to_string(),
        refresh: "refresh-1".to_string(),
    }
}

fn client(server: &MockServer, store: Arc<MemoryTokenStore>) -> ApiClient {
    let config = ApiConfig {
        base_url: format!("{}/v1", server.uri()),
        rate_limit_per_second: 1000,
        ..Default::default()
    };
    ApiClient::new(&config, store).expect("client")
}

fn user_json() -> serde_json::Value {
    json!({
        "id": 7,
        "username": "jane",
        "email": "jane@example.com",
        "birth_date": "1990-04-12",
        "phone_number": "010-1234-5678"
    })
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "success",
        "data": data,
        "message": "ok"
    }))
}

#[tokio::test]
async fn envelope_data_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/folders/"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ok(json!({
            "folders": [
                {"id": 1, "name": "Work", "unread_count": 2, "children": [
                    {"id": 2, "name": "Invoices", "parent_id": 1}
                ]}
            ]
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("access-1")));
    let api = client(&server, store);

    let folders = api.list_folders().await.expect("folders");
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].children[0].name, "Invoices");
}

#[tokio::test]
async fn no_backlog_is_recognised_by_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/classification/classify-unclassified/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "error",
            "data": null,
            "message": "There is nothing to do",
            "code": "NO_UNCLASSIFIED_MAILS"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("access-1")));
    let api = client(&server, store);

    let err = api.start_classification().await.unwrap_err();
    assert!(err.is_no_backlog(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn failure_envelope_with_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/users/auth/check-email"))
        .and(body_json(json!({"email": "jane@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "data": null,
            "message": "Email already registered",
            "error_code": 30002
        })))
        .mount(&server)
        .await;

    let api = client(&server, Arc::new(MemoryTokenStore::new()));

    match api.check_email("jane@example.com").await {
        Err(Error::Api { status, code, message }) => {
            assert_eq!(status, 200);
            assert_eq!(code, ApiErrorCode::EmailDuplicate);
            assert_eq!(message, "Email already registered");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn login_stores_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/users/auth/login"))
        .respond_with(ok(json!({
            "user": user_json(),
            "tokens": {"access": "access-9", "refresh": "refresh-9"}
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let api = client(&server, store.clone());

    let user = api
        .login(&LoginRequest {
            email: "jane@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        })
        .await
        .expect("login");
    assert_eq!(user.username, "jane");
    assert_eq!(
        store.load().await.unwrap(),
        Some(Tokens {
            access: "access-9".to_string(),
            refresh: "refresh-9".to_string()
        })
    );
}

#[tokio::test]
async fn requests_without_session_fail_locally() {
    let server = MockServer::start().await;
    let api = client(&server, Arc::new(MemoryTokenStore::new()));

    let err = api.me().await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_token_is_refreshed_once_for_concurrent_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "data": null,
            "message": "Token expired",
            "error_code": 20003
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/users/auth/token/refresh"))
        .and(body_json(json!({"refresh": "refresh-1"})))
        .respond_with(ok(json!({"access": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ok(user_json()))
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("stale")));
    let api = client(&server, store.clone());

    let (a, b, c) = tokio::join!(api.me(), api.me(), api.me());
    for result in [a, b, c] {
        assert_eq!(result.expect("me").id, 7);
    }
    assert_eq!(
        store.load().await.unwrap(),
        Some(Tokens {
            access: "fresh".to_string(),
            refresh: "refresh-1".to_string()
        })
    );
}

#[tokio::test]
async fn failed_refresh_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "data": null,
            "message": "Token expired",
            "code": "TOKEN_EXPIRED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/users/auth/token/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "data": null,
            "message": "Refresh token invalid",
            "error_code": 20004
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("stale")));
    let api = client(&server, store.clone());

    let err = api.me().await.unwrap_err();
    assert!(matches!(err, Error::TokenRefreshFailed(_)));
    assert!(err.requires_reauth());
    assert_eq!(store.load().await.unwrap(), None);
}

#[tokio::test]
async fn other_unauthorized_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "data": null,
            "message": "Invalid token",
            "error_code": 20004
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("bogus")));
    let api = client(&server, store.clone());

    let err = api.me().await.unwrap_err();
    assert_eq!(err.api_code(), Some(&ApiErrorCode::InvalidToken));
    assert!(store.load().await.unwrap().is_some());
}

#[tokio::test]
async fn counts_come_from_pagination_totals() {
    let server = MockServer::start().await;
    let page = |total: u64| {
        ok(json!({
            "mails": [],
            "pagination": {"total_count": total, "total_pages": total, "current_page": 1, "page_size": 1}
        }))
    };
    Mock::given(method("GET"))
        .and(path("/v1/mails/"))
        .and(query_param("is_read", "false"))
        .respond_with(page(4))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mails/"))
        .and(query_param("is_starred", "true"))
        .respond_with(page(2))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mails/"))
        .and(query_param("is_classified", "false"))
        .respond_with(page(9))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mails/"))
        .and(query_param("page_size", "1"))
        .respond_with(page(120))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("access-1")));
    let api = client(&server, store);

    let counts = api.virtual_folder_counts().await.expect("counts");
    assert_eq!(counts.all, 120);
    assert_eq!(counts.unread, 4);
    assert_eq!(counts.starred, 2);
    assert_eq!(counts.unclassified, 9);

    assert_eq!(JobApi::unclassified_count(&api).await.unwrap(), 9);
}

#[tokio::test]
async fn classification_status_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/classification/c-1/"))
        .respond_with(ok(json!({
            "classification_id": "c-1",
            "state": "completed",
            "summary": {"total": 40, "success": 38, "failed": 2, "new_folders_created": 1},
            "started_at": "2024-05-01T09:30:00Z",
            "completed_at": "2024-05-01T09:31:10Z",
            "error": null
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_tokens(tokens("access-1")));
    let api = client(&server, store);

    let status = api.classification_status("c-1").await.expect("status");
    assert!(status.state.is_terminal());
    assert_eq!(status.summary.success, 38);
}
