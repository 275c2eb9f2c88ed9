//! Read-only looks at the page: reply readiness, UI contract and transcript tail.

use std::time::Duration;

use chatturn_core_types::{
    normalize_for_compare, prompt_echo_matches, reply_fingerprint, stable_hash, tail_chars,
    ContentHash, PageProbe, ProbeError, ReplyAnchor, ReplyFingerprint, TurnRole,
};
use chrono::{DateTime, Utc};
use error_taxonomy::ErrorCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::condition::{Phase, ProbeResultExt, TurnError};
use crate::config::TurnConfig;
use crate::guard::{RouteGuard, TurnTarget};
use crate::machine::TurnRun;

const PROBE_STABILITY_BUDGET: Duration = Duration::from_secs(2);
const TAIL_HASH_CHARS: usize = 500;
const PREVIEW_CHARS: usize = 220;
pub const MAX_FETCH_LIMIT: usize = 50;
pub const UI_CONTRACT_VERSION: &str = "v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotReadyReason {
    PromptNotEchoed,
    AssistantUnstable,
    IndicatorVisible,
    AssistantBeforeAnchor,
    EmptyAssistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplyReadiness {
    pub ready: bool,
    pub reason: Option<NotReadyReason>,
    pub fingerprint: Option<ReplyFingerprint>,
    pub anchor: Option<ReplyAnchor>,
}

impl ReplyReadiness {
    fn not_ready(reason: NotReadyReason) -> Self {
        Self {
            ready: false,
            reason: Some(reason),
            fingerprint: None,
            anchor: None,
        }
    }
}

/// Whether the reply to `prompt` is on the page, anchored after it and holding still.
pub(crate) async fn reply_ready<P: PageProbe + ?Sized>(
    mut run: TurnRun<'_, P>,
    prompt: &str,
) -> Result<ReplyReadiness, TurnError> {
    run.enter(Phase::Route);
    run.guard().ensure_route(run.target(), run.deadline()).await?;
    run.enter(Phase::Inspect);
    let snapshot = run.read().await?;

    if !prompt_echo_matches(prompt, &snapshot.last_user_text) {
        return Ok(ReplyReadiness::not_ready(NotReadyReason::PromptNotEchoed));
    }
    if snapshot.assistant_after_last_user && snapshot.has_assistant_text() {
        let quiet = run.config().probe_stability();
        let (settled, last) = run
            .wait_settled_after_anchor(quiet, PROBE_STABILITY_BUDGET)
            .await?;
        if !settled {
            return Ok(ReplyReadiness::not_ready(NotReadyReason::AssistantUnstable));
        }
        return Ok(ReplyReadiness {
            ready: true,
            reason: None,
            fingerprint: Some(reply_fingerprint(prompt, &last)),
            anchor: Some(ReplyAnchor::from_snapshot(&last)),
        });
    }
    let reason = if snapshot.generation_indicator_visible {
        NotReadyReason::IndicatorVisible
    } else if snapshot.has_assistant_text() {
        NotReadyReason::AssistantBeforeAnchor
    } else {
        NotReadyReason::EmptyAssistant
    };
    Ok(ReplyReadiness::not_ready(reason))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UiContractReport {
    pub schema_version: &'static str,
    pub ok: bool,
    pub url: String,
    pub has_composer: bool,
    pub has_submit_control: bool,
    pub indicator_visible: bool,
    pub can_compute_anchor: bool,
    pub missing: Vec<&'static str>,
}

impl UiContractReport {
    pub fn code(&self) -> Option<ErrorCode> {
        (!self.ok).then_some(ErrorCode::UiContractFail)
    }
}

/// Checks that the page still exposes what the turn machine relies on.
pub(crate) async fn ui_contract<P: PageProbe + ?Sized>(
    probe: &P,
    config: &TurnConfig,
    target: &TurnTarget,
    deadline: tokio::time::Instant,
) -> Result<UiContractReport, TurnError> {
    RouteGuard::new(probe, config)
        .ensure_route(target, deadline)
        .await?;
    let readiness = probe.send_readiness().await.during(Phase::Inspect)?;
    let (url, can_compute_anchor) = match probe.read_state().await {
        Ok(snapshot) => (snapshot.url, true),
        Err(ProbeError::Contract(detail)) => {
            debug!(target: "turn-flow", %detail, "state payload incomplete");
            (target.url().to_string(), false)
        }
        Err(source) => {
            return Err(TurnError::Probe {
                phase: Phase::Inspect,
                source,
            })
        }
    };

    let mut missing = Vec::new();
    if !readiness.has_composer {
        missing.push("composer");
    }
    if !can_compute_anchor {
        missing.push("assistantAfterLastUser");
    }
    if !(readiness.has_submit_control || readiness.indicator_visible) {
        missing.push("submit_control");
    }
    let report = UiContractReport {
        schema_version: UI_CONTRACT_VERSION,
        ok: missing.is_empty(),
        url,
        has_composer: readiness.has_composer,
        has_submit_control: readiness.has_submit_control,
        indicator_visible: readiness.indicator_visible,
        can_compute_anchor,
        missing,
    };
    if let Some(code) = report.code() {
        warn!(target: "turn-flow", code = %code, missing = ?report.missing, "ui contract check failed");
    }
    Ok(report)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: TurnRole,
    pub text: String,
    pub text_len: usize,
    pub signature: String,
    /// Hash of the last 500 normalized characters.
    pub tail_hash: ContentHash,
    pub preview: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptTail {
    pub url: String,
    pub indicator_visible: bool,
    pub limit: usize,
    pub total: usize,
    pub assistant_after_last_user: bool,
    pub last_user_text: String,
    pub last_user_hash: ContentHash,
    pub user_tail_hash: ContentHash,
    pub assistant_text: String,
    pub assistant_tail_hash: ContentHash,
    pub checkpoint_id: String,
    pub captured_at: DateTime<Utc>,
    pub messages: Vec<TranscriptEntry>,
}

fn tail_hash(text: &str) -> ContentHash {
    stable_hash(&tail_chars(&normalize_for_compare(text), TAIL_HASH_CHARS))
}

pub fn checkpoint_id(captured_at: DateTime<Utc>, assistant_tail_hash: &ContentHash) -> String {
    format!(
        "SPC-{}-{}",
        captured_at.format("%Y-%m-%dT%H:%M:%SZ"),
        assistant_tail_hash.prefix(8).unwrap_or("none")
    )
}

pub(crate) async fn fetch_last<P: PageProbe + ?Sized>(
    probe: &P,
    config: &TurnConfig,
    target: &TurnTarget,
    limit: usize,
    deadline: tokio::time::Instant,
) -> Result<TranscriptTail, TurnError> {
    let limit = limit.clamp(1, MAX_FETCH_LIMIT);
    RouteGuard::new(probe, config)
        .ensure_route(target, deadline)
        .await?;
    let state = probe.read_state().await.during(Phase::Inspect)?;
    let messages = probe
        .read_transcript(limit)
        .await
        .during(Phase::Inspect)?;
    Ok(summarize(state.url, state.generation_indicator_visible, limit, messages, Utc::now()))
}

fn summarize(
    url: String,
    indicator_visible: bool,
    limit: usize,
    messages: Vec<chatturn_core_types::TranscriptMessage>,
    captured_at: DateTime<Utc>,
) -> TranscriptTail {
    let entries: Vec<TranscriptEntry> = messages
        .into_iter()
        .map(|message| {
            let text = message.text.trim().to_string();
            TranscriptEntry {
                role: message.role,
                text_len: text.chars().count(),
                tail_hash: tail_hash(&text),
                preview: text.chars().take(PREVIEW_CHARS).collect(),
                signature: message.signature,
                text,
            }
        })
        .collect();

    let last_user = entries.iter().rposition(|e| e.role == TurnRole::User);
    let last_assistant = entries.iter().rposition(|e| e.role == TurnRole::Assistant);
    let assistant_after_last_user = matches!(
        (last_user, last_assistant),
        (Some(user), Some(assistant)) if assistant > user
    );
    let last_user_text = last_user
        .map(|idx| entries[idx].text.clone())
        .unwrap_or_default();
    let assistant_text = last_assistant
        .map(|idx| entries[idx].text.clone())
        .unwrap_or_default();
    let assistant_tail_hash = tail_hash(&assistant_text);

    TranscriptTail {
        url,
        indicator_visible,
        limit,
        total: entries.len(),
        assistant_after_last_user,
        last_user_hash: stable_hash(&last_user_text),
        user_tail_hash: tail_hash(&last_user_text),
        checkpoint_id: checkpoint_id(captured_at, &assistant_tail_hash),
        assistant_tail_hash,
        last_user_text,
        assistant_text,
        captured_at,
        messages: entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatturn_core_types::TranscriptMessage;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn message(role: TurnRole, text: &str) -> TranscriptMessage {
        TranscriptMessage {
            role,
            text: text.into(),
            signature: format!("{role:?}|{}", text.len()),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
    }

    #[test]
    fn summary_tracks_last_turns() {
        let tail = summarize(
            "https://chatgpt.com/c/0123456789abcdef".into(),
            false,
            10,
            vec![
                message(TurnRole::User, "ping"),
                message(TurnRole::Assistant, "  pong  "),
            ],
            at(),
        );
        assert!(tail.assistant_after_last_user);
        assert_eq!(tail.last_user_text, "ping");
        assert_eq!(tail.assistant_text, "pong");
        assert_eq!(tail.total, 2);
        let prefix = tail.assistant_tail_hash.prefix(8).unwrap().to_string();
        assert_eq!(tail.checkpoint_id, format!("SPC-2025-03-04T05:06:07Z-{prefix}"));
    }

    #[test]
    fn no_assistant_means_none_checkpoint() {
        let tail = summarize(
            "https://chatgpt.com/".into(),
            true,
            1,
            vec![message(TurnRole::User, "ping")],
            at(),
        );
        assert!(!tail.assistant_after_last_user);
        assert_eq!(tail.assistant_tail_hash, ContentHash::Empty);
        assert_eq!(tail.checkpoint_id, "SPC-2025-03-04T05:06:07Z-none");
    }

    #[test]
    fn tail_hash_covers_only_the_end() {
        let long_a = format!("{}{}", "a".repeat(600), "b".repeat(500));
        let long_b = format!("{}{}", "c".repeat(50), "b".repeat(500));
        assert_eq!(tail_hash(&long_a), tail_hash(&long_b));

        let entries = summarize(
            String::new(),
            false,
            5,
            vec![message(TurnRole::Assistant, &"x".repeat(300))],
            at(),
        )
        .messages;
        assert_eq!(entries[0].preview.chars().count(), PREVIEW_CHARS);
        assert_eq!(entries[0].text_len, 300);
    }

    #[test]
    fn contract_report_code() {
        let report = UiContractReport {
            schema_version: UI_CONTRACT_VERSION,
            ok: false,
            url: String::new(),
            has_composer: false,
            has_submit_control: true,
            indicator_visible: false,
            can_compute_anchor: true,
            missing: vec!["composer"],
        };
        assert_eq!(report.code(), Some(ErrorCode::UiContractFail));
    }
}
