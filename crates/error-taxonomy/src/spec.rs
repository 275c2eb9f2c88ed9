use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    Routing,
    Input,
    Env,
    Concurrency,
    UiState,
    Timeout,
    Protocol,
    Recovery,
    Internal,
}

/// How hard a code blocks the caller's next step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockSeverity {
    NoBlock,
    SoftBlockRetryable,
    SoftBlockRecover,
    SoftBlockWait,
    HardBlockUser,
    HardBlockEnv,
    UnknownBlock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    RunStatus,
    RunExplain,
    AbortSafe,
    StepRecover,
    StepPreflight,
    StepComposerReady,
    StepWaitStarted,
    StepWaitFinished,
    StepRead,
    RetrySameStep,
}

/// Classification of one code. `code` echoes the looked-up string for fallback
/// and default specs, and the canonical code otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSpec {
    pub code: String,
    pub class: ErrorClass,
    pub block: BlockSeverity,
    pub title: &'static str,
    pub explanation: &'static str,
    pub recommended: &'static [RecommendedAction],
    pub safe_to_auto_retry: bool,
    pub expected_evidence: &'static [&'static str],
    pub tags: &'static [&'static str],
    pub aliases: &'static [&'static str],
}

/// Which lookup stage produced a spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Alias,
    Fallback,
    Default,
}
