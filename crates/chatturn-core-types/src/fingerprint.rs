use std::fmt;

use serde::{Serialize, Serializer};

use crate::snapshot::PageSnapshot;
use crate::text::{normalize_assistant_text, stable_hash};

/// Identity of "this answer to this anchored prompt".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReplyFingerprint(String);

impl ReplyFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user turn a reply is pinned to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReplyAnchor {
    Signature(String),
    /// Used when the page exposes no signature for the last user turn.
    UserCount(u32),
}

impl ReplyAnchor {
    pub fn from_snapshot(snapshot: &PageSnapshot) -> Self {
        if snapshot.last_user_signature.is_empty() {
            ReplyAnchor::UserCount(snapshot.user_turn_count)
        } else {
            ReplyAnchor::Signature(snapshot.last_user_signature.clone())
        }
    }
}

impl fmt::Display for ReplyAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyAnchor::Signature(sig) => f.write_str(sig),
            ReplyAnchor::UserCount(count) => write!(f, "user_count:{count}"),
        }
    }
}

impl Serialize for ReplyAnchor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Hash over prompt hash, assistant signature, normalized assistant text and both counts.
pub fn reply_fingerprint(prompt: &str, snapshot: &PageSnapshot) -> ReplyFingerprint {
    let payload = [
        stable_hash(prompt).as_str().to_string(),
        snapshot.last_assistant_signature.clone(),
        normalize_assistant_text(&snapshot.last_assistant_text),
        snapshot.user_turn_count.to_string(),
        snapshot.assistant_turn_count.to_string(),
    ]
    .join("|");
    // The payload always contains separators, so the hash is never the empty sentinel.
    ReplyFingerprint(stable_hash(&payload).as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answered(prompt_sig: &str, reply: &str) -> PageSnapshot {
        PageSnapshot {
            url: "https://chatgpt.com/c/0123456789abcdef".into(),
            user_turn_count: 3,
            assistant_turn_count: 3,
            last_user_text: "ping".into(),
            last_user_signature: prompt_sig.into(),
            last_assistant_text: reply.into(),
            last_assistant_signature: "a-3".into(),
            assistant_after_last_user: true,
            generation_indicator_visible: false,
        }
    }

    #[test]
    fn same_answer_same_fingerprint() {
        let a = reply_fingerprint("ping", &answered("u-3", "pong"));
        let b = reply_fingerprint("  ping ", &answered("u-3", "pong \u{258B}"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn different_prompt_or_reply_changes_fingerprint() {
        let base = reply_fingerprint("ping", &answered("u-3", "pong"));
        assert_ne!(base, reply_fingerprint("ping?", &answered("u-3", "pong")));
        assert_ne!(base, reply_fingerprint("ping", &answered("u-3", "pong!")));
        let mut shifted = answered("u-3", "pong");
        shifted.assistant_turn_count = 4;
        assert_ne!(base, reply_fingerprint("ping", &shifted));
    }

    #[test]
    fn anchor_prefers_signature() {
        assert_eq!(
            ReplyAnchor::from_snapshot(&answered("u-3", "pong")).to_string(),
            "u-3"
        );
        let unsigned = answered("", "pong");
        assert_eq!(
            ReplyAnchor::from_snapshot(&unsigned),
            ReplyAnchor::UserCount(3)
        );
        assert_eq!(ReplyAnchor::UserCount(3).to_string(), "user_count:3");
    }
}
