use once_cell::sync::Lazy;
use regex::Regex;

use crate::spec::{BlockSeverity as B, ErrorClass as C, ErrorSpec, RecommendedAction as A};

pub(crate) struct Template {
    pattern: &'static str,
    class: C,
    block: B,
    title: &'static str,
    explanation: &'static str,
    recommended: &'static [A],
    safe_to_auto_retry: bool,
    expected_evidence: &'static [&'static str],
    tags: &'static [&'static str],
}

impl Template {
    fn synthesize(&self, code: &str) -> ErrorSpec {
        ErrorSpec {
            code: code.to_string(),
            class: self.class,
            block: self.block,
            title: self.title,
            explanation: self.explanation,
            recommended: self.recommended,
            safe_to_auto_retry: self.safe_to_auto_retry,
            expected_evidence: self.expected_evidence,
            tags: self.tags,
            aliases: &[],
        }
    }
}

// Ordered: the first matching prefix wins.
static TEMPLATES: &[Template] = &[
    Template {
        pattern: r"^E_(ROUTE|CHAT|STRICT|TARGET|MULTIPLE_CHAT)_",
        class: C::Routing,
        block: B::HardBlockUser,
        title: "Routing safety block",
        explanation: "Routing-related error; sending is unsafe until the user resolves the correct target chat.",
        recommended: &[A::RunStatus, A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["active_url", "target_url"],
        tags: &["routing"],
    },
    Template {
        pattern: r"^E_(ACK|INPUT|ARG|DUPLICATE_PROMPT)_",
        class: C::Input,
        block: B::HardBlockUser,
        title: "Input/acknowledgement required",
        explanation: "User input or acknowledgement is required before proceeding.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["ack_policy"],
        tags: &["input"],
    },
    Template {
        pattern: r"^E_(CDP|CHROME|ENV|PROFILE|NET|LOGIN|CLOUDFLARE)_",
        class: C::Env,
        block: B::HardBlockEnv,
        title: "Environment error",
        explanation: "Automation environment is not ready (DevTools, browser, profile, network, login or challenge).",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &["cdp_probe", "ui_snapshot"],
        tags: &["env"],
    },
    Template {
        pattern: r"^E_(LOCK|SLOT|PID|STALE|CONC)_",
        class: C::Concurrency,
        block: B::SoftBlockRecover,
        title: "Concurrency/state artifact issue",
        explanation: "Lock, slot or pid artifact issue; safe recovery is likely available.",
        recommended: &[A::StepRecover, A::RunStatus, A::RetrySameStep],
        safe_to_auto_retry: true,
        expected_evidence: &["lock_info", "slot_table", "pid_probe"],
        tags: &["concurrency"],
    },
    Template {
        pattern: r"^E_(UI|COMPOSER|SEND_BUTTON|SELECTOR|PRECHECK|PROMPT_NOT_FOUND)_",
        class: C::UiState,
        block: B::SoftBlockRetryable,
        title: "UI readiness issue",
        explanation: "UI not ready or selectors drifted; preflight, retry or explain may be needed.",
        recommended: &[A::StepPreflight, A::StepComposerReady, A::RetrySameStep],
        safe_to_auto_retry: true,
        expected_evidence: &["ui_probe", "dom_markers"],
        tags: &["ui"],
    },
    Template {
        pattern: r"^E_(TIMEOUT|WAIT|ASSISTANT|REPLY_WAIT)_",
        class: C::Timeout,
        block: B::SoftBlockRecover,
        title: "Timeout/wait issue",
        explanation: "A stage exceeded its time budget or an assistant lifecycle marker was not observed.",
        recommended: &[A::StepWaitFinished, A::StepRecover, A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["stage_timing", "stop_visible"],
        tags: &["timeout"],
    },
    Template {
        pattern: r"^E_(PROTOCOL|CHECKPOINT|EVIDENCE)_",
        class: C::Protocol,
        block: B::SoftBlockRecover,
        title: "Protocol/checkpoint issue",
        explanation: "Protocol expected data (checkpoint or evidence) that is missing or inconsistent.",
        recommended: &[A::RunExplain, A::StepRecover],
        safe_to_auto_retry: true,
        expected_evidence: &["checkpoint_ref", "evidence_dir"],
        tags: &["protocol"],
    },
    Template {
        pattern: r"^W_(REPLY_LATE|SOFT_RESET|POSTSEND)_",
        class: C::Recovery,
        block: B::NoBlock,
        title: "Recovery warning",
        explanation: "Recovery path was used but may still have succeeded.",
        recommended: &[A::RunStatus],
        safe_to_auto_retry: true,
        expected_evidence: &["evidence_dir"],
        tags: &["recovery", "warning"],
    },
];

static RULES: Lazy<Vec<(Regex, &'static Template)>> = Lazy::new(|| {
    TEMPLATES
        .iter()
        .map(|template| {
            let regex = Regex::new(template.pattern).expect("fallback rule regex");
            (regex, template)
        })
        .collect()
});

pub(crate) fn synthesize(code: &str) -> Option<ErrorSpec> {
    RULES
        .iter()
        .find(|(regex, _)| regex.is_match(code))
        .map(|(_, template)| template.synthesize(code))
}

pub(crate) fn unknown(code: &str) -> ErrorSpec {
    ErrorSpec {
        code: code.to_string(),
        class: C::Internal,
        block: B::UnknownBlock,
        title: "Unknown error",
        explanation: "Error code is not recognized by the registry; inspect evidence and explain output.",
        recommended: &[A::RunExplain, A::AbortSafe],
        safe_to_auto_retry: false,
        expected_evidence: &[],
        tags: &["unknown"],
        aliases: &[],
    }
}
