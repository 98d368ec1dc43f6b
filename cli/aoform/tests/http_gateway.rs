//! HttpGateway against a mock HTTP server.

use aoform_cli::{Config, HttpGateway};
use aoform_reconcile::{GatewayError, NetworkGateway, Retryable, Signer, SpawnRequest, Tag};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> HttpGateway {
    let mut config = Config::default();
    config.gateway_url = server.uri();
    config.cu_url = server.uri();
    config.http_timeout_secs = 5;
    HttpGateway::new(&config).unwrap()
}

fn request() -> SpawnRequest {
    SpawnRequest {
        module: "module-tx".to_string(),
        scheduler: "scheduler-addr".to_string(),
        tags: vec![Tag::new("App", "demo")],
    }
}

#[tokio::test]
async fn test_spawn_sends_request_and_signer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/spawn"))
        .and(header("X-Signer-Address", "addr-1"))
        .and(body_partial_json(json!({
            "module": "module-tx",
            "scheduler": "scheduler-addr",
            "tags": [{ "name": "App", "value": "demo" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pid-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let pid = gateway_for(&server)
        .spawn(&request(), &Signer::new("addr-1"))
        .await
        .unwrap();

    assert_eq!(pid, "pid-1");
}

#[tokio::test]
async fn test_send_message_posts_eval() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/message"))
        .and(body_partial_json(json!({
            "process": "pid-1",
            "data": "print(1)",
            "tags": [{ "name": "Action", "value": "Eval" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let message_id = gateway_for(&server)
        .send_message("pid-1", "print(1)", &[Tag::eval_action()], &Signer::new("addr"))
        .await
        .unwrap();

    assert_eq!(message_id, "msg-1");
}

#[tokio::test]
async fn test_fetch_result_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/result/msg-1"))
        .and(query_param("process-id", "pid-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Output": { "data": "ok" },
            "Messages": [],
            "Error": null
        })))
        .mount(&server)
        .await;

    let result = gateway_for(&server).fetch_result("pid-1", "msg-1").await.unwrap();

    assert_eq!(result.error, None);
    assert_eq!(result.output, Some(json!({ "data": "ok" })));
}

#[tokio::test]
async fn test_fetch_result_reports_evaluation_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/result/msg-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "Error": "[string]:1: syntax error" })),
        )
        .mount(&server)
        .await;

    let result = gateway_for(&server).fetch_result("pid-1", "msg-1").await.unwrap();

    assert_eq!(result.error.as_deref(), Some("[string]:1: syntax error"));
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/spawn"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .spawn(&request(), &Signer::new("addr"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(err.to_string().contains("overloaded"));
}

#[tokio::test]
async fn test_client_errors_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/message"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad process"))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .send_message("pid-1", "x", &[], &Signer::new("addr"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Rejected(_)));
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .fetch_result("pid-1", "msg-1")
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unreachable_gateway_is_transient() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = Config::default();
    config.gateway_url = format!("http://127.0.0.1:{port}");
    let gateway = HttpGateway::new(&config).unwrap();

    let err = gateway
        .spawn(&request(), &Signer::new("addr"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_success_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/spawn"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .spawn(&request(), &Signer::new("addr"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Rejected(_)));
}
