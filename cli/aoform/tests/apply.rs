//! `aoform apply` end to end against a mock network.

use std::path::PathBuf;

use aoform_cli::commands::apply::ApplyCommand;
use aoform_cli::commands::CommandContext;
use aoform_cli::output::OutputFormat;
use aoform_cli::{CliError, Config};
use aoform_reconcile::{DeploymentState, ReconcileError};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WALLET: &str = r#"{"kty":"RSA","n":"aGVsbG8","e":"AQAB"}"#;

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    /// One process `p1` whose main source is `p1.lua`.
    fn new(source: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let processes = format!(
            "- name: p1\n  file: {}\n  module: mod-1\n  scheduler: sched-1\n",
            dir.path().join("p1.lua").display()
        );
        std::fs::write(dir.path().join("processes.yaml"), processes).unwrap();
        let project = Self { dir };
        project.write("p1.lua", source);
        project
    }

    fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents).unwrap();
    }

    fn desired(&self) -> PathBuf {
        self.dir.path().join("processes.yaml")
    }

    fn state(&self) -> DeploymentState {
        let raw = std::fs::read_to_string(self.dir.path().join("state.yaml")).unwrap();
        serde_yaml::from_str(&raw).unwrap()
    }

    fn has_state(&self) -> bool {
        self.dir.path().join("state.yaml").exists()
    }
}

fn context(server: &MockServer, wallet: Option<&str>) -> CommandContext {
    let mut config = Config::default();
    config.gateway_url = server.uri();
    config.cu_url = server.uri();
    config.retry_delay_secs = 0;
    if let Some(wallet) = wallet {
        config = config.with_wallet_json(wallet);
    }
    CommandContext {
        config,
        format: OutputFormat::Json,
    }
}

fn apply(project: &Project) -> ApplyCommand {
    ApplyCommand {
        file: Some(project.desired()),
        dry_run: false,
        single_phase: false,
        retry_attempts: Some(2),
        retry_delay: None,
    }
}

async fn mount_network(server: &MockServer, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/spawn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pid-1" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-1" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/result/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result))
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

#[tokio::test]
async fn test_apply_then_reapply_is_a_no_op() {
    let project = Project::new("Handlers.add('ping')");
    let server = MockServer::start().await;
    mount_network(&server, json!({ "Output": {} })).await;

    apply(&project).run(context(&server, Some(WALLET))).await.unwrap();

    let state = project.state();
    assert_eq!(state.process_id("p1"), Some("pid-1"));
    assert!(state.content_hash("p1").is_some());
    assert_eq!(request_count(&server).await, 3);

    apply(&project).run(context(&server, Some(WALLET))).await.unwrap();
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_missing_wallet_fails_before_network() {
    let project = Project::new("x = 1");
    let server = MockServer::start().await;
    mount_network(&server, json!({})).await;

    let err = apply(&project).run(context(&server, None)).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::MissingWallet)));
    assert_eq!(request_count(&server).await, 0);
    assert!(!project.has_state());
}

#[tokio::test]
async fn test_dry_run_needs_no_wallet_and_writes_nothing() {
    let project = Project::new("x = 1");
    let server = MockServer::start().await;

    let mut cmd = apply(&project);
    cmd.dry_run = true;
    cmd.run(context(&server, None)).await.unwrap();

    assert_eq!(request_count(&server).await, 0);
    assert!(!project.has_state());
}

#[tokio::test]
async fn test_remote_error_is_fatal_but_keeps_process_id() {
    let project = Project::new("syntax error here");
    let server = MockServer::start().await;
    mount_network(&server, json!({ "Error": "[string]:1: unexpected symbol" })).await;

    let err = apply(&project).run(context(&server, Some(WALLET))).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ReconcileError>(),
        Some(ReconcileError::RemoteEvaluation { .. })
    ));
    assert_eq!(aoform_cli::error::exit_code(&err), 1);

    let state = project.state();
    assert_eq!(state.process_id("p1"), Some("pid-1"));
    assert_eq!(state.content_hash("p1"), None);
}

#[tokio::test]
async fn test_unavailable_relay_fails_push_with_exit_code_two() {
    let project = Project::new("x = 1");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/spawn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pid-1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/message"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = apply(&project).run(context(&server, Some(WALLET))).await.unwrap_err();

    assert_eq!(aoform_cli::error::exit_code(&err), 2);
    // One spawn plus two send attempts.
    assert_eq!(request_count(&server).await, 3);
    assert_eq!(project.state().content_hash("p1"), None);
}
