//! Network gateway interface and mock implementation.
//!
//! The gateway abstracts the three operations the engine needs from the
//! network:
//! - Spawning a process from a runtime module on a scheduler
//! - Sending a signed message to a process
//! - Reading the result of a message
//!
//! A mock implementation is provided for testing and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::retry::Retryable;

/// Name/value metadata attached to a spawn or message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The tag marking a message as code evaluation.
    pub fn eval_action() -> Self {
        Self::new("Action", "Eval")
    }
}

/// Identity that signs spawns and messages.
///
/// The key material itself stays with the gateway implementation; the
/// engine only threads the identity through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    address: String,
}

impl Signer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Network address of the signing key.
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Parameters for spawning a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub module: String,
    pub scheduler: String,
    pub tags: Vec<Tag>,
}

/// Outcome of evaluating a message inside a process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalResult {
    /// Application-level error reported by the process.
    pub error: Option<String>,

    /// Raw output, if the process produced any.
    pub output: Option<serde_json::Value>,
}

impl EvalResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            error: Some(details.into()),
            output: None,
        }
    }
}

/// Gateway errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Connection, timeout or overloaded-upstream failure; worth retrying.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The network refused the request; retrying will not help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl Retryable for GatewayError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Network gateway interface.
#[async_trait]
pub trait NetworkGateway: Send + Sync {
    /// Spawn a new process and return its ID.
    async fn spawn(&self, request: &SpawnRequest, signer: &Signer) -> Result<String, GatewayError>;

    /// Send a message to a process and return the message ID.
    async fn send_message(
        &self,
        process_id: &str,
        data: &str,
        tags: &[Tag],
        signer: &Signer,
    ) -> Result<String, GatewayError>;

    /// Read the evaluation result of a message.
    async fn fetch_result(
        &self,
        process_id: &str,
        message_id: &str,
    ) -> Result<EvalResult, GatewayError>;
}

/// A message recorded by [`MockGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub process_id: String,
    pub data: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Default)]
struct MockScript {
    spawn_failures: u32,
    send_failures: u32,
    result_failures: u32,
    reject_spawns_after: Option<u64>,
    eval_errors: Vec<(String, String)>,
}

/// In-memory gateway for tests and development.
///
/// Process and message IDs are sequential. Failures are scripted up front and
/// consumed in order.
#[derive(Debug, Default)]
pub struct MockGateway {
    counter: AtomicU64,
    spawn_calls: AtomicU64,
    send_calls: AtomicU64,
    result_calls: AtomicU64,
    script: Mutex<MockScript>,
    spawned: Mutex<Vec<SpawnRequest>>,
    messages: Mutex<HashMap<String, SentMessage>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` spawns with a transient error.
    pub fn failing_spawns(self, n: u32) -> Self {
        self.script_mut(|s| s.spawn_failures = n);
        self
    }

    /// Reject every spawn with a non-retryable error.
    pub fn rejecting_spawns(self) -> Self {
        self.rejecting_spawns_after(0)
    }

    /// Let the first `n` spawn calls through, then reject the rest.
    pub fn rejecting_spawns_after(self, n: u64) -> Self {
        self.script_mut(|s| s.reject_spawns_after = Some(n));
        self
    }

    /// Fail the next `n` message sends with a transient error.
    pub fn failing_sends(self, n: u32) -> Self {
        self.script_mut(|s| s.send_failures = n);
        self
    }

    /// Fail the next `n` result reads with a transient error.
    pub fn failing_results(self, n: u32) -> Self {
        self.script_mut(|s| s.result_failures = n);
        self
    }

    /// Report an evaluation error for any message whose data contains `needle`.
    pub fn eval_error_when(self, needle: impl Into<String>, details: impl Into<String>) -> Self {
        self.script_mut(|s| s.eval_errors.push((needle.into(), details.into())));
        self
    }

    fn script_mut(&self, f: impl FnOnce(&mut MockScript)) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut script);
    }

    /// Consume one scripted failure from the selected counter.
    fn take_failure(&self, select: impl FnOnce(&mut MockScript) -> &mut u32) -> bool {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = select(&mut script);
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n:06}")
    }

    pub fn spawn_calls(&self) -> u64 {
        self.spawn_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> u64 {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> u64 {
        self.result_calls.load(Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn total_calls(&self) -> u64 {
        self.spawn_calls() + self.send_calls() + self.result_calls()
    }

    /// Successful spawn requests, in order.
    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.spawned.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Successfully sent messages, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NetworkGateway for MockGateway {
    async fn spawn(&self, request: &SpawnRequest, signer: &Signer) -> Result<String, GatewayError> {
        let call = self.spawn_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let reject_after = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reject_spawns_after;
        if reject_after.is_some_and(|n| call > n) {
            return Err(GatewayError::Rejected("[MOCK] spawn rejected".to_string()));
        }
        if self.take_failure(|s| &mut s.spawn_failures) {
            return Err(GatewayError::Transient("[MOCK] spawn timed out".to_string()));
        }

        let process_id = self.next_id("process");
        info!(
            module = %request.module,
            scheduler = %request.scheduler,
            signer = %signer.address(),
            process_id = %process_id,
            "[MOCK] Spawned process"
        );
        self.spawned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        Ok(process_id)
    }

    async fn send_message(
        &self,
        process_id: &str,
        data: &str,
        tags: &[Tag],
        _signer: &Signer,
    ) -> Result<String, GatewayError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_failure(|s| &mut s.send_failures) {
            return Err(GatewayError::Transient("[MOCK] send timed out".to_string()));
        }

        let message_id = self.next_id("message");
        let message = SentMessage {
            process_id: process_id.to_string(),
            data: data.to_string(),
            tags: tags.to_vec(),
        };
        debug!(process_id, message_id = %message_id, bytes = data.len(), "[MOCK] Message sent");

        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(message_id.clone(), message.clone());
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        Ok(message_id)
    }

    async fn fetch_result(
        &self,
        process_id: &str,
        message_id: &str,
    ) -> Result<EvalResult, GatewayError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_failure(|s| &mut s.result_failures) {
            return Err(GatewayError::Transient("[MOCK] result timed out".to_string()));
        }

        let message = self
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(message_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown message {message_id}")))?;
        if message.process_id != process_id {
            return Err(GatewayError::Rejected(format!(
                "message {message_id} does not belong to {process_id}"
            )));
        }

        let script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let error = script
            .eval_errors
            .iter()
            .find(|(needle, _)| message.data.contains(needle.as_str()))
            .map(|(_, details)| details.clone());

        Ok(EvalResult {
            error,
            output: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SpawnRequest {
        SpawnRequest {
            module: "mod".to_string(),
            scheduler: "sched".to_string(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_spawn_and_message() {
        let gateway = MockGateway::new();
        let signer = Signer::new("addr");

        let pid = gateway.spawn(&request(), &signer).await.unwrap();
        let mid = gateway
            .send_message(&pid, "print(1)", &[Tag::eval_action()], &signer)
            .await
            .unwrap();
        let result = gateway.fetch_result(&pid, &mid).await.unwrap();

        assert_eq!(result, EvalResult::ok());
        assert_eq!(gateway.total_calls(), 3);
        assert_eq!(gateway.sent()[0].tags, vec![Tag::eval_action()]);
    }

    #[tokio::test]
    async fn test_mock_scripted_failures() {
        let gateway = MockGateway::new().failing_spawns(1).eval_error_when("boom", "syntax error");
        let signer = Signer::new("addr");

        let err = gateway.spawn(&request(), &signer).await.unwrap_err();
        assert!(err.is_transient());

        let pid = gateway.spawn(&request(), &signer).await.unwrap();
        let mid = gateway.send_message(&pid, "boom()", &[], &signer).await.unwrap();
        let result = gateway.fetch_result(&pid, &mid).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("syntax error"));
    }

    #[tokio::test]
    async fn test_mock_rejects_spawns() {
        let gateway = MockGateway::new().rejecting_spawns();
        let err = gateway.spawn(&request(), &Signer::new("addr")).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
