use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

macro_rules! error_codes {
    ($($variant:ident => $code:literal,)+) => {
        /// Every code with its own registry entry.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ErrorCode {
            $($variant,)+
        }

        impl ErrorCode {
            pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$variant,)+];

            /// Wire form shared with external callers.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $code,)+
                }
            }
        }

        impl FromStr for ErrorCode {
            type Err = UnknownCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(ErrorCode::$variant),)+
                    other => Err(UnknownCode(other.to_string())),
                }
            }
        }
    };
}

error_codes! {
    RouteMismatch => "E_ROUTE_MISMATCH",
    NewChatGuard => "E_NEW_CHAT_GUARD",
    TargetUnresolved => "E_TARGET_UNRESOLVED",
    AckRequired => "E_ACK_REQUIRED",
    CdpDown => "E_CDP_DOWN",
    ProfileMissing => "E_PROFILE_MISSING",
    StaleLock => "E_STALE_LOCK",
    SlotBusy => "E_SLOT_BUSY",
    PidMismatch => "E_PID_MISMATCH",
    UiNotReady => "E_UI_NOT_READY",
    SendButtonDisabled => "E_SEND_BUTTON_DISABLED",
    SelectorDrift => "E_SELECTOR_DRIFT",
    UiContractFail => "E_UI_CONTRACT_FAIL",
    PageScriptFailed => "E_PAGE_SCRIPT_FAILED",
    PreflightStale => "E_PREFLIGHT_STALE",
    TimeoutBudget => "E_TIMEOUT_BUDGET",
    AssistantNoStart => "E_ASSISTANT_NO_START",
    AssistantStuck => "E_ASSISTANT_STUCK",
    CdpTimeoutRetry => "E_CDP_TIMEOUT_RETRY",
    CdpCallTimeout => "E_CDP_CALL_TIMEOUT",
    CheckpointMissing => "E_CHECKPOINT_MISSING",
    EvidenceRequiredMissing => "E_EVIDENCE_REQUIRED_MISSING",
    SoftResetApplied => "E_SOFT_RESET_APPLIED",
    SoftResetFailed => "E_SOFT_RESET_FAILED",
    SendRetryVetoIntraRun => "E_SEND_RETRY_VETO_INTRA_RUN",
    PromptNotConfirmedNoResend => "E_PROMPT_NOT_CONFIRMED_NO_RESEND",
    DispatchNotObserved => "E_DISPATCH_NOT_OBSERVED",
    ConfirmFetchLastFailed => "E_CONFIRM_FETCH_LAST_FAILED",
    StaleIndicatorIdle => "W_STALE_INDICATOR_IDLE",
    PostsendEchoSoft => "W_POSTSEND_ECHO_SOFT",
    PrecheckReplyAlreadyAvailable => "W_PRECHECK_REPLY_ALREADY_AVAILABLE",
    Internal => "E_INTERNAL",
}

impl ErrorCode {
    /// `W_*` codes describe a degraded but successful path.
    pub fn is_warning(&self) -> bool {
        self.as_str().starts_with("W_")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a registered error code")]
pub struct UnknownCode(pub String);
