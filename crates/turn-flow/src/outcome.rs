use chatturn_core_types::{ReplyAnchor, ReplyFingerprint};
use error_taxonomy::ErrorCode;
use serde::Serialize;

/// How the prompt was shown to have reached the conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// The newest user turn equals the prompt and is a new turn.
    Strict,
    /// Only a weaker signal (new turn, new signature, indicator) was seen.
    Soft,
    /// The prompt was already the last user turn; nothing was dispatched.
    Existing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TurnTimings {
    pub precheck_ms: u64,
    pub send_ms: u64,
    pub wait_ms: u64,
    pub total_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub text: String,
    pub confirmation: Confirmation,
    /// The reply was already on the page; no waiting for generation happened.
    pub reused: bool,
    pub fingerprint: ReplyFingerprint,
    pub anchor: ReplyAnchor,
    pub warnings: Vec<ErrorCode>,
    pub timings: TurnTimings,
}

/// Result of sending without waiting for the reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    pub confirmation: Confirmation,
    pub anchor: ReplyAnchor,
    pub user_turn_count: u32,
    /// Set when recovery found the prompt already answered.
    pub reply_text: Option<String>,
    pub warnings: Vec<ErrorCode>,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrecheckOutcome {
    pub reused: bool,
    pub text: Option<String>,
    pub fingerprint: Option<ReplyFingerprint>,
    pub anchor: Option<ReplyAnchor>,
    /// Only computed when nothing was reused.
    pub generation_in_progress: bool,
}

impl PrecheckOutcome {
    pub(crate) fn miss(generation_in_progress: bool) -> Self {
        Self {
            reused: false,
            text: None,
            fingerprint: None,
            anchor: None,
            generation_in_progress,
        }
    }
}
