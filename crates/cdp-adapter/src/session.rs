use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::transport::{CdpTransport, ChromiumTransport};

/// One attached page plus the call tuning that applies to it.
#[derive(Clone)]
pub struct PageSession {
    transport: Arc<dyn CdpTransport>,
    config: CdpConfig,
}

impl PageSession {
    pub fn new(transport: Arc<dyn CdpTransport>, config: CdpConfig) -> Self {
        Self { transport, config }
    }

    /// Opens the page websocket and fails fast when the endpoint is unreachable.
    pub async fn attach(ws_url: &str, config: CdpConfig) -> Result<Self, AdapterError> {
        let transport = ChromiumTransport::connect(ws_url).await?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &CdpConfig {
        &self.config
    }

    /// Issues a single protocol call. `timeout` falls back to `call_timeout_ms`.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, AdapterError> {
        let deadline =
            timeout.unwrap_or_else(|| Duration::from_millis(self.config.call_timeout_ms));
        metrics::record_call(method);
        let started = Instant::now();
        match self.transport.send_command(method, params, deadline).await {
            Ok(value) => {
                metrics::record_call_success(method, started.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_call_failure(method, kind_label(&err.kind));
                Err(err)
            }
        }
    }

    /// Evaluates `expression` in the page and returns its JSON value.
    ///
    /// Exceptions thrown by the script surface as [`AdapterErrorKind::Exception`].
    /// Execution-context loss is retried up to `eval_retry_limit` attempts; call
    /// timeouts are returned as-is.
    pub async fn evaluate(
        &self,
        expression: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, AdapterError> {
        let deadline =
            timeout.unwrap_or_else(|| Duration::from_millis(self.config.eval_timeout_ms));
        let attempts = self.config.eval_retry_limit.max(1);
        let backoff = Duration::from_millis(self.config.eval_retry_backoff_ms);

        let mut attempt = 1;
        loop {
            match self.evaluate_once(expression, deadline).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_transient_context_loss() => {
                    debug!(
                        target: "cdp-transport",
                        attempt,
                        hint = err.hint.as_deref().unwrap_or_default(),
                        "execution context lost; retrying evaluation"
                    );
                    metrics::record_eval_retry();
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    if err.is_transient_context_loss() {
                        warn!(target: "cdp-transport", attempts, "evaluation retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn evaluate_once(&self, expression: &str, deadline: Duration) -> Result<Value, AdapterError> {
        let params = json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        });
        let response = self.call("Runtime.evaluate", params, Some(deadline)).await?;
        extract_evaluation(response)
    }
}

fn extract_evaluation(response: Value) -> Result<Value, AdapterError> {
    if let Some(details) = response.get("exceptionDetails") {
        let description = details
            .pointer("/exception/description")
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("script threw")
            .to_string();
        return Err(AdapterError::new(AdapterErrorKind::Exception)
            .with_hint(description)
            .with_data(details.clone()));
    }
    Ok(response
        .pointer("/result/value")
        .cloned()
        .unwrap_or(Value::Null))
}

fn kind_label(kind: &AdapterErrorKind) -> &'static str {
    match kind {
        AdapterErrorKind::Timeout => "timeout",
        AdapterErrorKind::Protocol => "protocol",
        AdapterErrorKind::Exception => "exception",
        AdapterErrorKind::CdpIo => "io",
        AdapterErrorKind::Internal => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, AdapterError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value, AdapterError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CdpTransport for ScriptedTransport {
        async fn send_command(
            &self,
            method: &str,
            _params: Value,
            _deadline: Duration,
        ) -> Result<Value, AdapterError> {
            self.calls.lock().unwrap().push(method.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AdapterError::new(AdapterErrorKind::Internal)))
        }
    }

    fn context_lost() -> AdapterError {
        AdapterError::new(AdapterErrorKind::Protocol)
            .with_hint("cdp error -32000: Execution context was destroyed.")
    }

    fn value(v: Value) -> Result<Value, AdapterError> {
        Ok(json!({ "result": { "type": "object", "value": v } }))
    }

    #[tokio::test(start_paused = true)]
    async fn evaluate_returns_by_value() {
        let transport = ScriptedTransport::new(vec![value(json!({ "ok": true }))]);
        let session = PageSession::new(transport.clone(), CdpConfig::default());
        let out = session.evaluate("1", None).await.unwrap();
        assert_eq!(out, json!({ "ok": true }));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evaluate_retries_context_loss_then_succeeds() {
        let transport =
            ScriptedTransport::new(vec![Err(context_lost()), Err(context_lost()), value(json!(3))]);
        let session = PageSession::new(transport.clone(), CdpConfig::default());
        let out = session.evaluate("1+2", None).await.unwrap();
        assert_eq!(out, json!(3));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn evaluate_gives_up_after_retry_limit() {
        let transport = ScriptedTransport::new(vec![
            Err(context_lost()),
            Err(context_lost()),
            Err(context_lost()),
            value(json!("late")),
        ]);
        let session = PageSession::new(transport.clone(), CdpConfig::default());
        let err = session.evaluate("x", None).await.unwrap_err();
        assert!(err.is_transient_context_loss());
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(AdapterError::new(AdapterErrorKind::Timeout)),
            value(json!(1)),
        ]);
        let session = PageSession::new(transport.clone(), CdpConfig::default());
        let err = session.evaluate("x", None).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn script_exceptions_surface_description() {
        let transport = ScriptedTransport::new(vec![Ok(json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "TypeError: boom" }
            }
        }))]);
        let session = PageSession::new(transport, CdpConfig::default());
        let err = session.evaluate("boom()", None).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Exception);
        assert_eq!(err.hint.as_deref(), Some("TypeError: boom"));
    }
}
