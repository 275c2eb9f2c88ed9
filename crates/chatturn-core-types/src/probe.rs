use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProbeError;
use crate::snapshot::{PageSnapshot, SendReadiness, TranscriptMessage};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    #[serde(default)]
    pub accepted: bool,
    /// How the page was driven, e.g. `click` or `enter`.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAck {
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusAck {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAck {
    #[serde(default)]
    pub had_control: bool,
    #[serde(default)]
    pub clicked: bool,
    #[serde(default)]
    pub ok: bool,
}

/// Reads and mutates the conversation page. Implementations keep no turn state;
/// every call reflects the live page.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn read_state(&self) -> Result<PageSnapshot, ProbeError>;

    async fn send_readiness(&self) -> Result<SendReadiness, ProbeError>;

    /// Inserts `text` into the composer and triggers the submit control, falling
    /// back to a keyboard submit when no control is found.
    async fn submit_prompt(&self, text: &str) -> Result<SubmitAck, ProbeError>;

    async fn press_submit_key(&self) -> Result<KeyAck, ProbeError>;

    async fn focus_composer(&self) -> Result<FocusAck, ProbeError>;

    async fn click_stop_control(&self) -> Result<StopAck, ProbeError>;

    async fn is_composer_present(&self) -> Result<bool, ProbeError>;

    /// `document.readyState` of the page.
    async fn ready_state(&self) -> Result<String, ProbeError>;

    async fn navigate(&self, url: &str) -> Result<(), ProbeError>;

    async fn bring_to_front(&self) -> Result<(), ProbeError>;

    async fn reload(&self) -> Result<(), ProbeError>;

    /// Up to `limit` most recent turns, oldest first.
    async fn read_transcript(&self, limit: usize) -> Result<Vec<TranscriptMessage>, ProbeError>;
}
