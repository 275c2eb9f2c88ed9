//! [`PageProbe`] implementation that drives the chat UI through DevTools evaluations.

pub mod scripts;

use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, PageSession};
use chatturn_core_types::{
    FocusAck, KeyAck, PageProbe, PageSnapshot, ProbeError, SendReadiness, StopAck, SubmitAck,
    TranscriptMessage,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub use scripts::Selectors;

const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct CdpPageProbe {
    session: PageSession,
    selectors: Selectors,
}

impl CdpPageProbe {
    pub fn new(session: PageSession, selectors: Selectors) -> Self {
        Self { session, selectors }
    }

    pub fn selectors(&self) -> &Selectors {
        &self.selectors
    }

    /// Enables the Runtime and Page domains. Failures are logged and ignored.
    pub async fn prepare(&self) {
        for method in ["Runtime.enable", "Page.enable"] {
            if let Err(err) = self.session.call(method, json!({}), None).await {
                warn!(target: "page-probe", method, %err, "domain enable failed");
            }
        }
    }

    async fn eval<T: DeserializeOwned>(&self, what: &str, script: &str) -> Result<T, ProbeError> {
        let value = self
            .session
            .evaluate(script, None)
            .await
            .map_err(map_adapter_error)?;
        decode(what, value)
    }

    async fn call(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<(), ProbeError> {
        self.session
            .call(method, params, timeout)
            .await
            .map(|_| ())
            .map_err(map_adapter_error)
    }
}

fn decode<T: DeserializeOwned>(what: &str, value: Value) -> Result<T, ProbeError> {
    if value.is_null() {
        return Err(ProbeError::Contract(format!("{what}: script returned nothing")));
    }
    serde_json::from_value(value).map_err(|err| ProbeError::Contract(format!("{what}: {err}")))
}

pub fn map_adapter_error(err: AdapterError) -> ProbeError {
    let message = err.to_string();
    match err.kind {
        AdapterErrorKind::Timeout => ProbeError::Timeout(message),
        AdapterErrorKind::Protocol | AdapterErrorKind::Exception => ProbeError::Script(message),
        AdapterErrorKind::CdpIo | AdapterErrorKind::Internal => ProbeError::Transport(message),
    }
}

#[async_trait]
impl PageProbe for CdpPageProbe {
    async fn read_state(&self) -> Result<PageSnapshot, ProbeError> {
        let value = self
            .session
            .evaluate(&scripts::read_state(&self.selectors), None)
            .await
            .map_err(map_adapter_error)?;
        PageSnapshot::from_probe_value(value)
    }

    async fn send_readiness(&self) -> Result<SendReadiness, ProbeError> {
        self.eval("send readiness", &scripts::send_readiness(&self.selectors))
            .await
    }

    async fn submit_prompt(&self, text: &str) -> Result<SubmitAck, ProbeError> {
        let ack: SubmitAck = self
            .eval("submit", &scripts::submit_prompt(&self.selectors, text))
            .await?;
        debug!(
            target: "page-probe",
            accepted = ack.accepted,
            method = ack.method.as_deref().unwrap_or("-"),
            "submit evaluated"
        );
        Ok(ack)
    }

    async fn press_submit_key(&self) -> Result<KeyAck, ProbeError> {
        self.eval("submit key", &scripts::press_submit_key(&self.selectors))
            .await
    }

    async fn focus_composer(&self) -> Result<FocusAck, ProbeError> {
        self.eval("focus", &scripts::focus_composer(&self.selectors))
            .await
    }

    async fn click_stop_control(&self) -> Result<StopAck, ProbeError> {
        self.eval("stop click", &scripts::click_stop_control(&self.selectors))
            .await
    }

    async fn is_composer_present(&self) -> Result<bool, ProbeError> {
        self.eval("composer", &scripts::composer_present(&self.selectors))
            .await
    }

    async fn ready_state(&self) -> Result<String, ProbeError> {
        self.eval("ready state", scripts::READY_STATE).await
    }

    async fn navigate(&self, url: &str) -> Result<(), ProbeError> {
        debug!(target: "page-probe", url, "navigating");
        self.call("Page.navigate", json!({ "url": url }), Some(NAVIGATE_TIMEOUT))
            .await
    }

    async fn bring_to_front(&self) -> Result<(), ProbeError> {
        self.call("Page.bringToFront", json!({}), None).await
    }

    async fn reload(&self) -> Result<(), ProbeError> {
        self.call("Page.reload", json!({ "ignoreCache": true }), Some(NAVIGATE_TIMEOUT))
            .await
    }

    async fn read_transcript(&self, limit: usize) -> Result<Vec<TranscriptMessage>, ProbeError> {
        self.eval("transcript", &scripts::read_transcript(&self.selectors, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{CdpConfig, CdpTransport};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingTransport {
        responses: Mutex<VecDeque<Result<Value, AdapterError>>>,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingTransport {
        fn with(responses: Vec<Result<Value, AdapterError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                sent: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl CdpTransport for RecordingTransport {
        async fn send_command(
            &self,
            method: &str,
            params: Value,
            _deadline: Duration,
        ) -> Result<Value, AdapterError> {
            self.sent.lock().unwrap().push((method.to_string(), params));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    fn evaluated(value: Value) -> Result<Value, AdapterError> {
        Ok(json!({ "result": { "type": "object", "value": value } }))
    }

    fn probe(transport: Arc<RecordingTransport>) -> CdpPageProbe {
        CdpPageProbe::new(
            PageSession::new(transport, CdpConfig::default()),
            Selectors::default(),
        )
    }

    #[tokio::test]
    async fn read_state_validates_payload() {
        let transport = RecordingTransport::with(vec![evaluated(json!({
            "url": "https://chatgpt.com/c/0123456789abcdef",
            "userTurnCount": 1,
            "assistantTurnCount": 1,
            "lastUserText": "ping",
            "lastUserSignature": "|||0|4",
            "lastAssistantText": "pong",
            "lastAssistantSignature": "|||1|4",
            "assistantAfterLastUser": true,
            "generationIndicatorVisible": false
        }))]);
        let snapshot = probe(transport.clone()).read_state().await.unwrap();
        assert_eq!(snapshot.last_assistant_text, "pong");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "Runtime.evaluate");
        assert_eq!(sent[0].1["returnByValue"], true);
    }

    #[tokio::test]
    async fn malformed_payload_is_contract_error() {
        let transport = RecordingTransport::with(vec![evaluated(json!({ "url": 3 }))]);
        let err = probe(transport).read_state().await.unwrap_err();
        assert!(matches!(err, ProbeError::Contract(_)));
    }

    #[tokio::test]
    async fn submit_ack_decodes() {
        let transport =
            RecordingTransport::with(vec![evaluated(json!({ "accepted": true, "method": "click" }))]);
        let ack = probe(transport).submit_prompt("ping").await.unwrap();
        assert_eq!(
            ack,
            SubmitAck {
                accepted: true,
                method: Some("click".into()),
                error: None
            }
        );
    }

    #[tokio::test]
    async fn adapter_kinds_map_to_probe_errors() {
        let transport = RecordingTransport::with(vec![
            Err(AdapterError::new(AdapterErrorKind::Timeout)),
            Err(AdapterError::new(AdapterErrorKind::CdpIo)),
            Ok(json!({
                "result": { "type": "object" },
                "exceptionDetails": { "text": "Uncaught ReferenceError" }
            })),
        ]);
        let probe = probe(transport);
        assert!(matches!(probe.ready_state().await, Err(ProbeError::Timeout(_))));
        assert!(matches!(probe.is_composer_present().await, Err(ProbeError::Transport(_))));
        assert!(matches!(probe.send_readiness().await, Err(ProbeError::Script(_))));
    }

    #[tokio::test]
    async fn navigation_uses_page_domain() {
        let transport = RecordingTransport::with(vec![Ok(json!({ "frameId": "F" })), Ok(json!({}))]);
        let probe = probe(transport.clone());
        probe.navigate("https://chatgpt.com/c/abc").await.unwrap();
        probe.reload().await.unwrap();
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "Page.navigate");
        assert_eq!(sent[0].1["url"], "https://chatgpt.com/c/abc");
        assert_eq!(sent[1].0, "Page.reload");
        assert_eq!(sent[1].1["ignoreCache"], true);
    }

    #[tokio::test]
    async fn transcript_decodes_roles() {
        let transport = RecordingTransport::with(vec![evaluated(json!([
            { "role": "user", "text": "ping", "signature": "u" },
            { "role": "assistant", "text": "pong", "signature": "a" }
        ]))]);
        let messages = probe(transport).read_transcript(2).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, chatturn_core_types::TurnRole::Assistant);
    }
}
