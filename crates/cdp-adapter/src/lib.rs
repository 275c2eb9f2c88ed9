//! DevTools transport for a single page target.
//!
//! The adapter attaches to an already running Chromium through the page's own
//! `webSocketDebuggerUrl`. It exposes the two primitives the turn machinery needs:
//! correlated request/response calls and `Runtime.evaluate` with bounded retries for
//! transient execution-context failures. Protocol events are never surfaced.

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        /// No correlated response arrived before the call deadline.
        #[error("cdp call timed out")]
        Timeout,
        /// The remote side answered the call with a protocol error.
        #[error("cdp protocol error")]
        Protocol,
        /// The evaluated expression threw inside the page.
        #[error("page script exception")]
        Exception,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn is_timeout(&self) -> bool {
            self.kind == AdapterErrorKind::Timeout
        }

        /// Remote failures caused by a navigation or re-render racing the evaluation.
        pub fn is_transient_context_loss(&self) -> bool {
            if !matches!(
                self.kind,
                AdapterErrorKind::Protocol | AdapterErrorKind::Exception
            ) {
                return false;
            }
            self.hint
                .as_deref()
                .map(|hint| {
                    hint.contains("Execution context was destroyed")
                        || hint.contains("Promise was collected")
                })
                .unwrap_or(false)
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};

    /// Connection and call tuning for the DevTools endpoint.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub host: String,
        pub port: u16,
        pub call_timeout_ms: u64,
        pub eval_timeout_ms: u64,
        /// Total attempts for one evaluation, including the first.
        pub eval_retry_limit: u32,
        pub eval_retry_backoff_ms: u64,
        pub list_timeout_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                host: "127.0.0.1".to_string(),
                port: 9222,
                call_timeout_ms: 30_000,
                eval_timeout_ms: 10_000,
                eval_retry_limit: 3,
                eval_retry_backoff_ms: 150,
                list_timeout_ms: 5_000,
            }
        }
    }

    impl CdpConfig {
        pub fn http_base(&self) -> String {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

pub mod metrics;
pub mod session;
pub mod targets;
pub mod transport;

pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use metrics::AdapterMetricsSnapshot;
pub use session::PageSession;
pub use targets::{list_targets, TargetInfo};
pub use transport::{CdpTransport, ChromiumTransport};
