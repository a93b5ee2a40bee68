//! Order submission client.
//!
//! One `SubmissionAdapter` drives one submit control on the page. It posts a
//! JSON body with the session's CSRF token, interprets the portal's
//! `{success, message}` reply and tracks where the attempt stands:
//!
//! - **Idle -> Submitting** when `submit` is called,
//! - **Submitting -> Succeeded** on a 2xx reply with `success: true`,
//! - **Submitting -> Failed** on `success: false`, a non-2xx status, a
//!   timeout or a network error.
//!
//! While an attempt is in flight every other `submit` on the same adapter
//! is refused, which is the equivalent of disabling the button. A failed
//! attempt may be retried. The idempotency key is bound to the exact request
//! body: a retry of the same body after a transport failure reuses it, while
//! a changed body or a server rejection starts a fresh key. A succeeded
//! attempt must be `reset` before the adapter accepts a new order.

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::payload::SubmitResponse;

/// Default timeout for portal requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const CSRF_HEADER: &str = "X-CSRFToken";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an attempt did not succeed. All of these end the current attempt and
/// none are retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Rejected on the client before any request was made.
    #[error("{0}")]
    Validation(String),
    /// Network failure, timeout, non-2xx status or an unreadable body.
    #[error("{0}")]
    Transport(String),
    /// The server answered `success: false`; the message is kept verbatim.
    #[error("{0}")]
    Application(String),
    /// Another attempt is in flight or the order was already placed.
    #[error("Submission {0}")]
    Busy(&'static str),
}

impl SubmitError {
    /// Text for the page's message area.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Validation(message) => message.clone(),
            SubmitError::Transport(message) | SubmitError::Application(message) => {
                format!("Error: {message}")
            }
            SubmitError::Busy(_) => self.to_string(),
        }
    }
}

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return format!("Request to {url} timed out");
    }
    if err.is_connect() {
        return format!("Cannot reach portal at {url}");
    }
    if err.is_builder() {
        return format!("Invalid portal URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired, please sign in again".to_string(),
        403 => "Request was refused (CSRF check failed or not permitted)".to_string(),
        404 => "Order endpoint not found".to_string(),
        s if s >= 500 => format!("Portal server error (HTTP {s})"),
        s => format!("Unexpected response from portal (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Submitting,
    Succeeded,
    Failed { message: String },
}

/// What the server handed back for the last successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub idempotency_key: Uuid,
    pub message: String,
    pub order_number: Option<String>,
    pub bill_id: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Key of an unfinished attempt and the body it was issued for.
#[derive(Debug)]
struct PendingKey {
    key: Uuid,
    body: String,
}

#[derive(Debug)]
struct AdapterInner {
    state: SubmissionState,
    pending: Option<PendingKey>,
    receipt: Option<SubmissionReceipt>,
}

pub struct SubmissionAdapter {
    client: Client,
    endpoint: String,
    csrf_token: String,
    inner: Mutex<AdapterInner>,
}

impl std::fmt::Debug for SubmissionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionAdapter")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Puts the adapter back into a retryable state if the request future is
/// dropped before it finishes.
struct InFlight<'a> {
    adapter: &'a SubmissionAdapter,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.adapter.lock().state = SubmissionState::Failed {
                message: "Submission cancelled".into(),
            };
        }
    }
}

impl SubmissionAdapter {
    pub fn new(
        endpoint: impl Into<String>,
        csrf_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            csrf_token: csrf_token.into(),
            inner: Mutex::new(AdapterInner {
                state: SubmissionState::Idle,
                pending: None,
                receipt: None,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn lock(&self) -> MutexGuard<'_, AdapterInner> {
        // The guarded data stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state.clone()
    }

    pub fn receipt(&self) -> Option<SubmissionReceipt> {
        self.lock().receipt.clone()
    }

    /// Key that a retry of the same body would carry, if one is pending.
    pub fn pending_idempotency_key(&self) -> Option<Uuid> {
        self.lock().pending.as_ref().map(|p| p.key)
    }

    /// Dismiss a failure so the control is shown as ready again.
    pub fn acknowledge(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, SubmissionState::Failed { .. }) {
            inner.state = SubmissionState::Idle;
        }
    }

    /// Start over for a new order. Ignored while an attempt is in flight.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != SubmissionState::Submitting {
            inner.state = SubmissionState::Idle;
            inner.pending = None;
        }
    }

    /// Claim the adapter for one attempt and hand out its idempotency key.
    /// The pending key is reused only for a byte-identical body.
    fn begin(&self, body: &str) -> Result<Uuid, SubmitError> {
        let mut inner = self.lock();
        match inner.state {
            SubmissionState::Submitting => return Err(SubmitError::Busy("already in progress")),
            SubmissionState::Succeeded => return Err(SubmitError::Busy("already completed")),
            SubmissionState::Idle | SubmissionState::Failed { .. } => {}
        }
        inner.state = SubmissionState::Submitting;
        match &inner.pending {
            Some(pending) if pending.body == body => Ok(pending.key),
            _ => {
                let key = Uuid::new_v4();
                inner.pending = Some(PendingKey {
                    key,
                    body: body.to_string(),
                });
                Ok(key)
            }
        }
    }

    /// Post `body` and interpret the reply.
    pub async fn submit<T: Serialize + ?Sized>(
        &self,
        body: &T,
    ) -> Result<SubmitResponse, SubmitError> {
        let body = serde_json::to_string(body)
            .map_err(|e| SubmitError::Validation(format!("Cannot encode request: {e}")))?;
        let key = self.begin(&body)?;
        let mut flight = InFlight {
            adapter: self,
            finished: false,
        };

        let result = self.send(&body, key).await;

        {
            let mut inner = self.lock();
            match &result {
                Ok(response) => {
                    inner.state = SubmissionState::Succeeded;
                    inner.pending = None;
                    inner.receipt = Some(SubmissionReceipt {
                        idempotency_key: key,
                        message: response.message.clone(),
                        order_number: response.order_number.clone(),
                        bill_id: response.bill_id.clone(),
                        completed_at: Utc::now(),
                    });
                }
                Err(err) => {
                    // The server has answered this key; the next attempt is new.
                    if matches!(err, SubmitError::Application(_)) {
                        inner.pending = None;
                    }
                    inner.state = SubmissionState::Failed {
                        message: err.to_string(),
                    };
                }
            }
        }
        flight.finished = true;

        match &result {
            Ok(response) => info!(
                endpoint = %self.endpoint,
                idempotency_key = %key,
                order_number = response.order_number.as_deref().unwrap_or(""),
                bill_id = response.bill_id.as_deref().unwrap_or(""),
                "submission succeeded"
            ),
            Err(err) => warn!(
                endpoint = %self.endpoint,
                idempotency_key = %key,
                error = %err,
                "submission failed"
            ),
        }
        result
    }

    async fn send(&self, body: &str, key: Uuid) -> Result<SubmitResponse, SubmitError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CSRF_HEADER, &self.csrf_token)
            .header(IDEMPOTENCY_HEADER, key.to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| SubmitError::Transport(friendly_error(&self.endpoint, &e)))?;

        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| SubmitError::Transport(friendly_error(&self.endpoint, &e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|json| {
                    json.get("message")
                        .or_else(|| json.get("error"))
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string())
                })
                .filter(|s| !s.is_empty());
            let message = match detail {
                Some(detail) => format!("{} (HTTP {}): {detail}", status_error(status), status.as_u16()),
                None => status_error(status),
            };
            return Err(SubmitError::Transport(message));
        }

        let response: SubmitResponse = serde_json::from_str(&body_text)
            .map_err(|e| SubmitError::Transport(format!("Invalid JSON from portal: {e}")))?;
        if !response.success {
            return Err(SubmitError::Application(response.message));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct Reply {
        status: u16,
        body: Value,
        delay: Duration,
    }

    fn reply(status: u16, body: Value) -> Reply {
        Reply {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<(HeaderMap, Value)>>,
        replies: Mutex<VecDeque<Reply>>,
    }

    impl Recorder {
        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn header(&self, call: usize, name: &str) -> String {
            self.requests.lock().unwrap()[call]
                .0
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        }
    }

    async fn handle(
        State(recorder): State<Arc<Recorder>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (axum::http::StatusCode, Json<Value>) {
        recorder.requests.lock().unwrap().push((headers, body));
        let next = recorder.replies.lock().unwrap().pop_front();
        let next = next.unwrap_or_else(|| reply(200, json!({"success": true, "message": "ok"})));
        if !next.delay.is_zero() {
            tokio::time::sleep(next.delay).await;
        }
        (
            axum::http::StatusCode::from_u16(next.status).unwrap(),
            Json(next.body),
        )
    }

    async fn spawn_server(replies: Vec<Reply>) -> (String, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        recorder.replies.lock().unwrap().extend(replies);
        let app = Router::new()
            .route("/customer/orders/", post(handle))
            .with_state(recorder.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
        (format!("http://{addr}/customer/orders/"), recorder)
    }

    fn adapter(endpoint: &str) -> SubmissionAdapter {
        SubmissionAdapter::new(endpoint, "csrf-abc", Duration::from_secs(5)).expect("adapter")
    }

    #[tokio::test]
    async fn test_success_sends_headers_and_records_receipt() {
        let (url, recorder) = spawn_server(vec![reply(
            200,
            json!({"success": true, "message": "Order placed successfully!", "order_number": "ORD-20240101120000"}),
        )])
        .await;
        let adapter = adapter(&url);
        let body = json!({"items": [{"item_id": "1", "quantity": 2, "price": 50.0}]});

        let response = adapter.submit(&body).await.expect("submit");
        assert_eq!(response.order_number.as_deref(), Some("ORD-20240101120000"));
        assert_eq!(adapter.state(), SubmissionState::Succeeded);
        assert_eq!(adapter.pending_idempotency_key(), None);

        assert_eq!(recorder.calls(), 1);
        assert_eq!(recorder.header(0, "x-csrftoken"), "csrf-abc");
        let key = recorder.header(0, "idempotency-key");
        assert!(Uuid::parse_str(&key).is_ok());
        assert_eq!(recorder.requests.lock().unwrap()[0].1, body);

        let receipt = adapter.receipt().expect("receipt");
        assert_eq!(receipt.idempotency_key.to_string(), key);
        assert_eq!(receipt.message, "Order placed successfully!");
    }

    #[tokio::test]
    async fn test_application_error_keeps_message_verbatim() {
        let message = "NOT NULL constraint failed: customer_portal_customerorder.additional_notes";
        let (url, _recorder) =
            spawn_server(vec![reply(200, json!({"success": false, "message": message}))]).await;
        let adapter = adapter(&url);

        let err = adapter.submit(&json!({"items": []})).await.expect_err("fails");
        assert_eq!(err, SubmitError::Application(message.to_string()));
        assert_eq!(err.user_message(), format!("Error: {message}"));
        assert_eq!(
            adapter.state(),
            SubmissionState::Failed {
                message: message.to_string()
            }
        );

        adapter.acknowledge();
        assert_eq!(adapter.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let (url, _recorder) = spawn_server(vec![reply(
            500,
            json!({"success": false, "message": "boom"}),
        )])
        .await;
        let adapter = adapter(&url);
        let err = adapter.submit(&json!({})).await.expect_err("fails");
        match err {
            SubmitError::Transport(message) => {
                assert!(message.contains("HTTP 500"), "{message}");
                assert!(message.contains("boom"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let adapter = adapter(&format!("http://{addr}/customer/orders/"));
        let err = adapter.submit(&json!({})).await.expect_err("fails");
        assert!(matches!(err, SubmitError::Transport(_)));
        assert!(matches!(adapter.state(), SubmissionState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_fails_attempt() {
        let (url, _recorder) = spawn_server(vec![Reply {
            status: 200,
            body: json!({"success": true, "message": "late"}),
            delay: Duration::from_secs(2),
        }])
        .await;
        let adapter =
            SubmissionAdapter::new(&url, "csrf-abc", Duration::from_millis(200)).expect("adapter");
        let err = adapter.submit(&json!({})).await.expect_err("times out");
        match err {
            SubmitError::Transport(message) => assert!(message.contains("timed out"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_double_submit_is_refused_while_in_flight() {
        let (url, recorder) = spawn_server(vec![Reply {
            status: 200,
            body: json!({"success": true, "message": "ok"}),
            delay: Duration::from_millis(200),
        }])
        .await;
        let adapter = Arc::new(adapter(&url));
        let body = json!({"items": [{"item_id": "1", "quantity": 1}]});

        let (first, second) = tokio::join!(adapter.submit(&body), adapter.submit(&body));
        assert!(first.is_ok());
        assert_eq!(second, Err(SubmitError::Busy("already in progress")));
        assert_eq!(recorder.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_reuses_idempotency_key_until_success() {
        let (url, recorder) = spawn_server(vec![
            reply(502, json!({})),
            reply(200, json!({"success": true, "message": "ok", "order_number": "ORD-1"})),
            reply(200, json!({"success": true, "message": "ok", "order_number": "ORD-2"})),
        ])
        .await;
        let adapter = adapter(&url);
        let body = json!({"items": [{"item_id": "1", "quantity": 1}]});

        assert!(adapter.submit(&body).await.is_err());
        let pending = adapter.pending_idempotency_key().expect("key kept for retry");
        adapter.submit(&body).await.expect("retry succeeds");
        assert_eq!(recorder.header(0, "idempotency-key"), pending.to_string());
        assert_eq!(recorder.header(1, "idempotency-key"), pending.to_string());

        // A completed order is not re-posted until the adapter is reset.
        assert_eq!(
            adapter.submit(&body).await,
            Err(SubmitError::Busy("already completed"))
        );
        assert_eq!(recorder.calls(), 2);

        adapter.reset();
        adapter.submit(&body).await.expect("new order");
        assert_ne!(recorder.header(2, "idempotency-key"), pending.to_string());
    }

    #[tokio::test]
    async fn test_rejected_or_changed_order_gets_new_key() {
        let (url, recorder) = spawn_server(vec![
            reply(200, json!({"success": false, "message": "Item 7 is out of stock"})),
            reply(502, json!({})),
            reply(200, json!({"success": true, "message": "ok"})),
        ])
        .await;
        let adapter = adapter(&url);
        let five = json!({"items": [{"item_id": "7", "quantity": 5}]});
        let two = json!({"items": [{"item_id": "7", "quantity": 2}]});
        let three = json!({"items": [{"item_id": "7", "quantity": 3}]});

        // The server answered the first key, so it is not carried forward.
        let err = adapter.submit(&five).await.expect_err("out of stock");
        assert!(matches!(err, SubmitError::Application(_)));
        assert_eq!(adapter.pending_idempotency_key(), None);

        // A gateway failure keeps the key, but only for the same body.
        assert!(adapter.submit(&two).await.is_err());
        assert!(adapter.pending_idempotency_key().is_some());
        adapter.submit(&three).await.expect("edited order placed");

        let first = recorder.header(0, "idempotency-key");
        let second = recorder.header(1, "idempotency-key");
        let third = recorder.header(2, "idempotency-key");
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
        assert_eq!(recorder.requests.lock().unwrap()[2].1, three);
    }

    #[tokio::test]
    async fn test_unreadable_body_is_transport_error() {
        let (url, _recorder) = spawn_server(vec![reply(200, json!(["not", "an", "object"]))]).await;
        let adapter = adapter(&url);
        let err = adapter.submit(&json!({})).await.expect_err("fails");
        match err {
            SubmitError::Transport(message) => assert!(message.contains("Invalid JSON")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
