use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProbeError;

/// A point-in-time read of the conversation page.
///
/// Text and signature fields are trimmed; an empty string means the page had no
/// such turn. Snapshots are replaced wholesale on every read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub user_turn_count: u32,
    pub assistant_turn_count: u32,
    pub last_user_text: String,
    pub last_user_signature: String,
    pub last_assistant_text: String,
    pub last_assistant_signature: String,
    pub assistant_after_last_user: bool,
    pub generation_indicator_visible: bool,
}

/// Shape accepted from the page script before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    url: Option<String>,
    user_turn_count: Option<u32>,
    assistant_turn_count: Option<u32>,
    last_user_text: Option<String>,
    last_user_signature: Option<String>,
    last_assistant_text: Option<String>,
    last_assistant_signature: Option<String>,
    assistant_after_last_user: Option<bool>,
    generation_indicator_visible: Option<bool>,
}

impl PageSnapshot {
    /// Validates a probe payload. Counts, url, anchor position and indicator are
    /// mandatory; text and signatures default to "absent".
    pub fn from_probe_value(value: Value) -> Result<Self, ProbeError> {
        if !value.is_object() {
            return Err(ProbeError::Contract(format!(
                "snapshot must be an object, got {}",
                kind_of(&value)
            )));
        }
        let raw: RawSnapshot = serde_json::from_value(value)
            .map_err(|err| ProbeError::Contract(format!("snapshot: {err}")))?;

        let url = raw.url.ok_or_else(|| missing("url"))?;
        let user_turn_count = raw.user_turn_count.ok_or_else(|| missing("userTurnCount"))?;
        let assistant_turn_count = raw
            .assistant_turn_count
            .ok_or_else(|| missing("assistantTurnCount"))?;
        let assistant_after_last_user = raw
            .assistant_after_last_user
            .ok_or_else(|| missing("assistantAfterLastUser"))?;
        let generation_indicator_visible = raw
            .generation_indicator_visible
            .ok_or_else(|| missing("generationIndicatorVisible"))?;

        let trimmed = |field: Option<String>| field.map(|s| s.trim().to_string()).unwrap_or_default();

        Ok(Self {
            url,
            user_turn_count,
            assistant_turn_count,
            last_user_text: trimmed(raw.last_user_text),
            last_user_signature: trimmed(raw.last_user_signature),
            last_assistant_text: trimmed(raw.last_assistant_text),
            last_assistant_signature: trimmed(raw.last_assistant_signature),
            assistant_after_last_user,
            generation_indicator_visible,
        })
    }

    pub fn marker(&self) -> TurnMarker {
        TurnMarker {
            user_count: self.user_turn_count,
            assistant_count: self.assistant_turn_count,
            user_signature: self.last_user_signature.clone(),
            assistant_signature: self.last_assistant_signature.clone(),
        }
    }

    pub fn has_assistant_text(&self) -> bool {
        !self.last_assistant_text.trim().is_empty()
    }
}

fn missing(field: &str) -> ProbeError {
    ProbeError::Contract(format!("snapshot is missing `{field}`"))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Counts plus last-turn signatures; changes whenever a turn appears or re-renders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TurnMarker {
    pub user_count: u32,
    pub assistant_count: u32,
    pub user_signature: String,
    pub assistant_signature: String,
}

/// Composer and indicator state used by readiness polling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReadiness {
    #[serde(default)]
    pub has_composer: bool,
    #[serde(default)]
    pub has_submit_control: bool,
    #[serde(default)]
    pub indicator_visible: bool,
}

impl SendReadiness {
    pub fn is_ready(&self) -> bool {
        self.has_composer && !self.indicator_visible
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One rendered conversation turn, as returned by transcript reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub role: TurnRole,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub signature: String,
}
