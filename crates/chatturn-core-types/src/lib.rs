//! Shared vocabulary of the chat-turn engine: page snapshots, text normalization and
//! fingerprints, and the [`PageProbe`] seam every page interaction goes through.

pub mod errors;
pub mod fingerprint;
pub mod probe;
pub mod snapshot;
pub mod text;

pub use errors::ProbeError;
pub use fingerprint::{reply_fingerprint, ReplyAnchor, ReplyFingerprint};
pub use probe::{FocusAck, KeyAck, PageProbe, StopAck, SubmitAck};
pub use snapshot::{PageSnapshot, SendReadiness, TranscriptMessage, TurnMarker, TurnRole};
pub use text::{
    normalize_assistant_text, normalize_for_compare, prompt_echo_matches, stable_hash,
    tail_chars, ContentHash,
};
