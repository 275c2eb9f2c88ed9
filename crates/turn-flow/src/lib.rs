//! Chat turn state machine: route guard, dispatch with echo verification, reply wait
//! with stability detection, and soft-reset recovery.
//!
//! All page access goes through [`PageProbe`]; the machine itself never touches a
//! browser and is driven in tests by a scripted fake.

mod condition;
mod config;
mod guard;
mod inspect;
mod machine;
mod outcome;
mod poll;
mod recovery;
mod service;

pub use chatturn_core_types::PageProbe;
pub use condition::{Phase, RecoveryStep, TurnError};
pub use config::TurnConfig;
pub use error_taxonomy::{ErrorCode, ErrorSpec};
pub use guard::{ConversationId, GuardState, ReadyReport, RouteGuard, RouteReport, TurnTarget};
pub use inspect::{
    checkpoint_id, NotReadyReason, ReplyReadiness, TranscriptEntry, TranscriptTail,
    UiContractReport, MAX_FETCH_LIMIT, UI_CONTRACT_VERSION,
};
pub use machine::{
    activity_observed, dispatch_signal, echo_confirmed, reply_positioned, soft_signal, DispatchSignal,
    ReplyMarker, StabilityTracker, StuckTracker,
};
pub use outcome::{Confirmation, DispatchReceipt, PrecheckOutcome, TurnOutcome, TurnTimings};
pub use poll::{poll_until, Heartbeat, Poller};
pub use recovery::{soft_reset, RecoveryReport};
pub use service::TurnService;
