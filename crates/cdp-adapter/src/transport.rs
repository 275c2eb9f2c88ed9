use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, Message, MethodId, Response};
use futures::{future::BoxFuture, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;

/// Request/response channel to one DevTools target.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Sends `method` and waits for the response carrying the same call id.
    ///
    /// Unsolicited events arriving meanwhile are dropped. Quiet periods on the socket do
    /// not fail the call; only `deadline` does.
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError>;
}

type RuntimeFactory =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Arc<RuntimeState>, AdapterError>> + Send + Sync>;

/// Transport over chromiumoxide's raw connection. Reconnects lazily if the
/// socket loop has died.
#[derive(Clone)]
pub struct ChromiumTransport {
    ws_url: String,
    state: Arc<OnceCell<Mutex<Option<Arc<RuntimeState>>>>>,
    factory: RuntimeFactory,
}

impl ChromiumTransport {
    pub fn new(ws_url: impl Into<String>) -> Self {
        let factory: RuntimeFactory = Arc::new(|ws_url: String| {
            Box::pin(async move {
                let state = RuntimeState::start(&ws_url).await?;
                Ok(Arc::new(state))
            })
        });

        Self {
            ws_url: ws_url.into(),
            state: Arc::new(OnceCell::new()),
            factory,
        }
    }

    /// Connects eagerly so that an unreachable endpoint fails at attach time.
    pub async fn connect(ws_url: impl Into<String>) -> Result<Self, AdapterError> {
        let transport = Self::new(ws_url);
        transport.runtime().await?;
        Ok(transport)
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    async fn runtime(&self) -> Result<Arc<RuntimeState>, AdapterError> {
        let cell = self.state.get_or_init(|| async { Mutex::new(None) }).await;
        let mut guard = cell.lock().await;

        if let Some(rt) = guard.as_ref() {
            if rt.is_alive() {
                return Ok(rt.clone());
            }
            debug!(target: "cdp-transport", url = %self.ws_url, "connection loop ended; reconnecting");
        }

        let runtime = (self.factory)(self.ws_url.clone()).await?;
        *guard = Some(runtime.clone());
        Ok(runtime)
    }

    #[cfg(test)]
    fn with_factory(ws_url: &str, factory: RuntimeFactory) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            state: Arc::new(OnceCell::new()),
            factory,
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let runtime = self.runtime().await?;
        runtime.send_internal(method, params, deadline).await
    }
}

struct ControlMessage {
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, AdapterError>>,
}

struct RuntimeState {
    command_tx: mpsc::Sender<ControlMessage>,
    loop_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl RuntimeState {
    async fn start(ws_url: &str) -> Result<Self, AdapterError> {
        let conn = Connection::<CdpEventMessage>::connect(ws_url)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let loop_task = tokio::spawn(async move {
            let result = Self::run_loop(conn, command_rx).await;
            loop_alive.store(false, Ordering::Relaxed);
            if let Err(err) = result {
                error!(target: "cdp-transport", ?err, "transport loop terminated with error");
            }
        });

        info!(target: "cdp-transport", url = %ws_url, "devtools connection established");

        Ok(Self {
            command_tx,
            loop_task,
            alive,
        })
    }

    #[cfg(test)]
    fn test_stub() -> (Arc<Self>, Arc<AtomicBool>) {
        let (command_tx, _command_rx) = mpsc::channel(8);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();
        let loop_task = tokio::spawn(async move {
            futures::future::pending::<()>().await;
            loop_alive.store(false, Ordering::Relaxed);
        });

        (
            Arc::new(Self {
                command_tx,
                loop_task,
                alive: alive.clone(),
            }),
            alive,
        )
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send_internal(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let message = ControlMessage {
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        self.command_tx
            .send(message)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string()))?;

        match tokio::time::timeout(deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("command response channel closed")),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(format!("no response to {method} within {}ms", deadline.as_millis()))),
        }
    }

    async fn run_loop(
        mut conn: Connection<CdpEventMessage>,
        mut command_rx: mpsc::Receiver<ControlMessage>,
    ) -> Result<(), AdapterError> {
        let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>> =
            HashMap::new();

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => {
                    Self::handle_command(&mut conn, cmd, &mut inflight)?;
                }
                message = conn.next() => {
                    match message {
                        Some(Ok(Message::Response(resp))) => {
                            Self::handle_response(resp, &mut inflight);
                        }
                        Some(Ok(Message::Event(_))) => {
                            metrics::record_discarded_event();
                            trace!(target: "cdp-transport", "dropped unsolicited event");
                        }
                        Some(Err(err)) => {
                            let adapter_err = Self::map_cdp_error(err);
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(adapter_err.clone()));
                            }
                            return Err(adapter_err);
                        }
                        None => {
                            let err = AdapterError::new(AdapterErrorKind::CdpIo)
                                .with_hint("cdp connection closed");
                            for (_, sender) in inflight.drain() {
                                let _ = sender.send(Err(err.clone()));
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_command(
        conn: &mut Connection<CdpEventMessage>,
        cmd: ControlMessage,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>,
    ) -> Result<(), AdapterError> {
        let pruned = prune_abandoned(inflight);
        if pruned > 0 {
            trace!(target: "cdp-transport", pruned, "dropped calls whose callers gave up");
        }

        let method_id: MethodId = cmd.method.clone().into();
        match conn.submit_command(method_id, None, cmd.params) {
            Ok(call_id) => {
                inflight.insert(call_id, cmd.responder);
                Ok(())
            }
            Err(err) => {
                let adapter_err =
                    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string());
                let _ = cmd.responder.send(Err(adapter_err.clone()));
                Err(adapter_err)
            }
        }
    }

    fn handle_response(
        resp: Response,
        inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, AdapterError>>>,
    ) {
        let entry = inflight.remove(&resp.id);
        let result = Self::extract_payload(resp);

        // A missing entry means the caller already gave up on its deadline.
        if let Some(sender) = entry {
            let _ = sender.send(result);
        }
    }

    fn extract_payload(resp: Response) -> Result<Value, AdapterError> {
        if let Some(result) = resp.result {
            Ok(result)
        } else if let Some(error) = resp.error {
            Err(AdapterError::new(AdapterErrorKind::Protocol)
                .with_hint(format!("cdp error {}: {}", error.code, error.message)))
        } else {
            Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
        }
    }

    fn map_cdp_error(err: CdpError) -> AdapterError {
        let hint = err.to_string();
        match err {
            CdpError::Timeout => AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(hint)
                .retriable(true),
            CdpError::Serde(_) => AdapterError::new(AdapterErrorKind::Internal).with_hint(hint),
            _ => AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(hint)
                .retriable(true),
        }
    }
}

/// Removes calls whose caller stopped waiting. Returns how many were removed.
fn prune_abandoned<K: Eq + Hash>(
    inflight: &mut HashMap<K, oneshot::Sender<Result<Value, AdapterError>>>,
) -> usize {
    let before = inflight.len();
    inflight.retain(|_, sender| !sender.is_closed());
    before - inflight.len()
}

impl Drop for RuntimeState {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
    }
}
