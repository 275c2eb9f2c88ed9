use crate::codes::ErrorCode;
use crate::spec::{BlockSeverity as B, ErrorClass as C, ErrorSpec, RecommendedAction as A};

pub(crate) struct Entry {
    pub code: ErrorCode,
    pub class: C,
    pub block: B,
    pub title: &'static str,
    pub explanation: &'static str,
    pub recommended: &'static [A],
    pub safe_to_auto_retry: bool,
    pub expected_evidence: &'static [&'static str],
    pub tags: &'static [&'static str],
    pub aliases: &'static [&'static str],
}

impl Entry {
    pub fn to_spec(&self) -> ErrorSpec {
        ErrorSpec {
            code: self.code.as_str().to_string(),
            class: self.class,
            block: self.block,
            title: self.title,
            explanation: self.explanation,
            recommended: self.recommended,
            safe_to_auto_retry: self.safe_to_auto_retry,
            expected_evidence: self.expected_evidence,
            tags: self.tags,
            aliases: self.aliases,
        }
    }
}

/// Registry v1. Alias lookup walks this table in order, so an alias listed under two
/// codes resolves to the earlier one.
pub(crate) static ENTRIES: &[Entry] = &[
    Entry {
        code: ErrorCode::RouteMismatch,
        class: C::Routing,
        block: B::HardBlockUser,
        title: "Active tab does not match target work chat",
        explanation: "Strict routing check failed; sending is unsafe until the correct chat is active.",
        recommended: &[A::RunStatus, A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["active_url", "target_url", "route_probe", "tab_fingerprint"],
        tags: &["strict_single_chat", "routing"],
        aliases: &["E_STRICT_CHAT_MISMATCH", "E_CHAT_MISMATCH", "E_MULTIPLE_CHAT_TABS_BLOCKED"],
    },
    Entry {
        code: ErrorCode::NewChatGuard,
        class: C::Routing,
        block: B::HardBlockUser,
        title: "New chat creation prevented",
        explanation: "UI state indicates risk of creating a new chat; blocked to prevent misrouting.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["ui_snapshot", "active_url"],
        tags: &["routing", "new_chat_prevent"],
        aliases: &["E_PREVENT_NEW_CHAT", "E_NEW_CHAT_PREVENTED"],
    },
    Entry {
        code: ErrorCode::TargetUnresolved,
        class: C::Routing,
        block: B::HardBlockUser,
        title: "Target chat not resolved",
        explanation: "The target chat could not be resolved to a unique tab or conversation identity.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["target_hint", "active_url"],
        tags: &["routing"],
        aliases: &["E_TARGET_CHAT_REQUIRED", "E_TAB_NOT_FOUND"],
    },
    Entry {
        code: ErrorCode::AckRequired,
        class: C::Input,
        block: B::HardBlockUser,
        title: "Acknowledgement required",
        explanation: "Safety acknowledgement is required before proceeding.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["ack_policy"],
        tags: &["ack"],
        aliases: &["E_ACK_MISSING", "E_REPLY_UNACKED_BLOCK_SEND"],
    },
    Entry {
        code: ErrorCode::CdpDown,
        class: C::Env,
        block: B::HardBlockEnv,
        title: "CDP endpoint unreachable",
        explanation: "Cannot connect to the DevTools endpoint; automation is unavailable.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["cdp_probe"],
        tags: &["env", "cdp"],
        aliases: &["E_CDP_UNREACHABLE", "E_CHROME_NOT_RUNNING"],
    },
    Entry {
        code: ErrorCode::ProfileMissing,
        class: C::Env,
        block: B::HardBlockEnv,
        title: "Chrome profile not found/accessible",
        explanation: "Configured Chrome profile path is missing or has permission issues.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["profile_path"],
        tags: &["env"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::StaleLock,
        class: C::Concurrency,
        block: B::SoftBlockRecover,
        title: "Stale lock detected",
        explanation: "Lock appears stale or owned by a dead run; safe recovery can clean it up.",
        recommended: &[A::StepRecover, A::RunStatus, A::RetrySameStep],
        safe_to_auto_retry: true,
        expected_evidence: &["lock_info", "pid_probe"],
        tags: &["lock", "stale"],
        aliases: &["E_LOCK_HELD", "E_LOCK_BUSY", "E_CHAT_SINGLE_FLIGHT_TIMEOUT"],
    },
    Entry {
        code: ErrorCode::SlotBusy,
        class: C::Concurrency,
        block: B::SoftBlockRecover,
        title: "All CDP slots busy",
        explanation: "No free slot; safe recovery can reclaim a stale slot or instruct to wait.",
        recommended: &[A::RunStatus, A::StepRecover, A::RetrySameStep],
        safe_to_auto_retry: true,
        expected_evidence: &["slot_table"],
        tags: &["slot"],
        aliases: &["E_NO_FREE_SLOT"],
    },
    Entry {
        code: ErrorCode::PidMismatch,
        class: C::Concurrency,
        block: B::SoftBlockRecover,
        title: "PID artifact mismatch",
        explanation: "State references a PID that does not match the current owner; recovery can reconcile.",
        recommended: &[A::StepRecover, A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["pid_probe", "state_ref"],
        tags: &["pid", "stale"],
        aliases: &["E_STALE_PID_ARTIFACT"],
    },
    Entry {
        code: ErrorCode::UiNotReady,
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "UI not ready for safe send",
        explanation: "Composer or critical DOM markers are missing or unstable; preflight or retry needed.",
        recommended: &[A::StepPreflight, A::StepComposerReady, A::RetrySameStep],
        safe_to_auto_retry: true,
        expected_evidence: &["ui_probe", "dom_markers"],
        tags: &["ui"],
        aliases: &["E_COMPOSER_NOT_READY", "E_PRECHECK_NO_NEW_REPLY"],
    },
    Entry {
        code: ErrorCode::SendButtonDisabled,
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "Send button disabled",
        explanation: "Send action is not available (empty composer or UI state).",
        recommended: &[A::StepComposerReady, A::RetrySameStep],
        safe_to_auto_retry: true,
        expected_evidence: &["ui_probe"],
        tags: &["ui"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::SelectorDrift,
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "UI selector drift detected",
        explanation: "UI structure changed; probes failed to locate expected elements.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["ui_snapshot", "dom_markers"],
        tags: &["ui", "selectors"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::UiContractFail,
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "UI contract probe failed",
        explanation: "One or more page elements the send flow depends on could not be located.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["ui_contract", "active_url"],
        tags: &["ui", "selectors", "contract"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::PageScriptFailed,
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "Page script failed",
        explanation: "A page probe script threw inside the page; the page may be mid-render.",
        recommended: &[A::StepPreflight, A::RetrySameStep, A::RunExplain],
        safe_to_auto_retry: true,
        expected_evidence: &["script_error", "phase"],
        tags: &["ui", "probe"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::PreflightStale,
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "Fresh preflight required before delegated send",
        explanation: "UI or chat state may have changed since the last read-only preflight, so delegated send is blocked until a fresh preflight is collected.",
        recommended: &[A::StepPreflight, A::RunStatus, A::RunExplain],
        safe_to_auto_retry: true,
        expected_evidence: &["status_ref", "checkpoint_ref", "route_probe"],
        tags: &["facade", "preflight", "freshness"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::TimeoutBudget,
        class: C::Timeout,
        block: B::SoftBlockRecover,
        title: "Timeout budget exceeded",
        explanation: "A stage exceeded its time budget; safe recovery or a wait strategy may apply.",
        recommended: &[A::StepRecover, A::StepWaitStarted, A::StepWaitFinished, A::RunExplain],
        safe_to_auto_retry: true,
        expected_evidence: &["stage_timing", "stop_visible", "last_markers"],
        tags: &["timeout"],
        aliases: &[
            "E_WAIT_TIMEOUT",
            "E_REPLY_WAIT_TIMEOUT_STOP_VISIBLE",
            "E_REPLY_WAIT_TIMEOUT_NO_ACTIVITY",
        ],
    },
    Entry {
        code: ErrorCode::AssistantNoStart,
        class: C::Timeout,
        block: B::SoftBlockRecover,
        title: "Assistant did not start",
        explanation: "Send may be confirmed but the assistant start marker was not observed; recovery may help.",
        recommended: &[A::StepRecover, A::StepWaitStarted, A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["assistant_markers", "last_markers"],
        tags: &["timeout", "assistant"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::AssistantStuck,
        class: C::Timeout,
        block: B::SoftBlockWait,
        title: "Assistant appears to be still generating",
        explanation: "Generating indicator remains active; waiting is the safest action.",
        recommended: &[A::StepWaitFinished, A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["stop_visible", "assistant_markers"],
        tags: &["assistant", "wait"],
        aliases: &["E_REPLY_WAIT_TIMEOUT_STOP_VISIBLE"],
    },
    Entry {
        code: ErrorCode::CdpTimeoutRetry,
        class: C::Timeout,
        block: B::SoftBlockRecover,
        title: "Timeout retry recovery path engaged",
        explanation: "An evaluation timeout triggered recovery logic; the next action depends on confirm-only and dedupe results.",
        recommended: &[A::RunExplain, A::RunStatus],
        safe_to_auto_retry: false,
        expected_evidence: &["stage_timing", "protocol_jsonl", "ops_snapshot"],
        tags: &["timeout", "recovery"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::CdpCallTimeout,
        class: C::Timeout,
        block: B::SoftBlockRecover,
        title: "DevTools call timed out",
        explanation: "A page call received no response before its deadline; the page state after the call is unknown.",
        recommended: &[A::RunStatus, A::StepRecover, A::RunExplain],
        safe_to_auto_retry: false,
        expected_evidence: &["phase", "stage_timing", "last_markers"],
        tags: &["timeout", "cdp"],
        aliases: &["E_RUNTIME_EVAL_TIMEOUT"],
    },
    Entry {
        code: ErrorCode::CheckpointMissing,
        class: C::Protocol,
        block: B::SoftBlockRecover,
        title: "Required checkpoint missing",
        explanation: "Protocol expected a checkpoint but it is absent or corrupt; recovery can rebuild safely.",
        recommended: &[A::StepRecover, A::RunExplain],
        safe_to_auto_retry: true,
        expected_evidence: &["checkpoint_ref", "run_dir"],
        tags: &["protocol"],
        aliases: &["E_PROTOCOL_CHECKPOINT_MISSING"],
    },
    Entry {
        code: ErrorCode::EvidenceRequiredMissing,
        class: C::Protocol,
        block: B::SoftBlockRecover,
        title: "Required evidence missing",
        explanation: "Evidence required by protocol was not recorded; investigate and recover.",
        recommended: &[A::RunExplain, A::StepRecover],
        safe_to_auto_retry: true,
        expected_evidence: &["evidence_dir", "run_dir"],
        tags: &["evidence", "protocol"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::SoftResetApplied,
        class: C::Recovery,
        block: B::NoBlock,
        title: "Soft reset applied successfully",
        explanation: "Recovery succeeded; the next step can proceed normally.",
        recommended: &[A::StepRead, A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["recovery_markers"],
        tags: &["recovery"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::SoftResetFailed,
        class: C::Recovery,
        block: B::SoftBlockRecover,
        title: "Soft reset failed",
        explanation: "The reload and reroute cycle did not complete; a fresh recovery or read-only validation is needed.",
        recommended: &[A::RunExplain, A::StepRecover, A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["recovery_markers", "ui_snapshot", "cdp_probe"],
        tags: &["recovery", "timeout"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::SendRetryVetoIntraRun,
        class: C::Recovery,
        block: B::SoftBlockRecover,
        title: "Retry send blocked inside the same run",
        explanation: "A previous dispatch may have already delivered the prompt, so an automatic resend inside the same run was vetoed.",
        recommended: &[A::RunStatus, A::RunExplain, A::StepWaitFinished],
        safe_to_auto_retry: false,
        expected_evidence: &["protocol_jsonl", "fetch_last", "ops_snapshot"],
        tags: &["recovery", "dedupe", "no_resend"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::PromptNotConfirmedNoResend,
        class: C::Recovery,
        block: B::SoftBlockRecover,
        title: "Delivery could not be confirmed; resend blocked by safety policy",
        explanation: "The prompt could not be confirmed in the conversation and the run stopped without resending to avoid duplicates.",
        recommended: &[A::RunStatus, A::RunExplain],
        safe_to_auto_retry: false,
        expected_evidence: &["protocol_jsonl", "fetch_last", "ops_snapshot"],
        tags: &["recovery", "dedupe", "confirm_only", "availability_cost"],
        aliases: &["E_MESSAGE_NOT_ECHOED"],
    },
    Entry {
        code: ErrorCode::DispatchNotObserved,
        class: C::Recovery,
        block: B::SoftBlockRecover,
        title: "Submit produced no observable effect",
        explanation: "The page acknowledged the submit but no new turn, signature change or generation indicator followed, even after a keyboard fallback.",
        recommended: &[A::RunStatus, A::RunExplain],
        safe_to_auto_retry: false,
        expected_evidence: &["baseline_markers", "last_markers", "submit_method"],
        tags: &["dispatch", "no_resend"],
        aliases: &["E_SEND_NOT_DISPATCHED"],
    },
    Entry {
        code: ErrorCode::ConfirmFetchLastFailed,
        class: C::Env,
        block: B::HardBlockEnv,
        title: "Failed to confirm chat state after timeout",
        explanation: "Read-only confirmation of the transcript failed, so the run stopped fail-closed without resending.",
        recommended: &[A::RunStatus, A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["cdp_probe", "protocol_jsonl", "fetch_last"],
        tags: &["env", "recovery", "confirm_only", "fail_closed"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::StaleIndicatorIdle,
        class: C::Recovery,
        block: B::NoBlock,
        title: "Stale generation indicator treated as idle",
        explanation: "The generation indicator stayed visible without any turn change, so the page was treated as idle.",
        recommended: &[A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["stop_visible", "last_markers"],
        tags: &["recovery", "warning", "stale"],
        aliases: &["E_STALE_STOP_ASSUME_IDLE"],
    },
    Entry {
        code: ErrorCode::PostsendEchoSoft,
        class: C::Recovery,
        block: B::NoBlock,
        title: "Prompt delivery confirmed by weaker signal",
        explanation: "The exact prompt echo was never observed, but turn counts, signatures or the generation indicator changed after the send.",
        recommended: &[A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["baseline_markers", "last_markers"],
        tags: &["recovery", "warning", "echo"],
        aliases: &["E_MESSAGE_NOT_ECHOED_SOFT"],
    },
    Entry {
        code: ErrorCode::PrecheckReplyAlreadyAvailable,
        class: C::Recovery,
        block: B::NoBlock,
        title: "Reply already available",
        explanation: "The prompt was already the last turn and a stable answer follows it; the answer was reused without sending.",
        recommended: &[A::StepRead],
        safe_to_auto_retry: true,
        expected_evidence: &["reply_fingerprint", "reply_anchor"],
        tags: &["dedupe", "warning"],
        aliases: &[],
    },
    Entry {
        code: ErrorCode::Internal,
        class: C::Internal,
        block: B::UnknownBlock,
        title: "Internal error",
        explanation: "An unexpected internal failure occurred; inspect logs and explain output.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &[],
        tags: &["internal"],
        aliases: &[],
    },
];
