//! Conditions raised by a turn, each mapped to one registry code.

use std::fmt;

use chatturn_core_types::{ProbeError, TurnMarker};
use error_taxonomy::{resolve, ErrorCode, ErrorSpec};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Stage of a turn, carried by conditions and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Route,
    Readiness,
    IdleGate,
    DupCheck,
    Dispatch,
    DispatchVerify,
    EchoVerify,
    ReplyWaitActivity,
    ReplyWaitStable,
    Recover,
    Inspect,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Route => "ROUTE",
            Phase::Readiness => "READINESS",
            Phase::IdleGate => "IDLE_GATE",
            Phase::DupCheck => "DUP_CHECK",
            Phase::Dispatch => "DISPATCH",
            Phase::DispatchVerify => "DISPATCH_VERIFY",
            Phase::EchoVerify => "ECHO_VERIFY",
            Phase::ReplyWaitActivity => "REPLY_WAIT_ACTIVITY",
            Phase::ReplyWaitStable => "REPLY_WAIT_STABLE",
            Phase::Recover => "RECOVER",
            Phase::Inspect => "INSPECT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soft reset step whose failure is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStep {
    Route,
    Composer,
    SendReady,
}

impl fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecoveryStep::Route => "route",
            RecoveryStep::Composer => "composer",
            RecoveryStep::SendReady => "send_ready",
        })
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("page is on {active_url}, expected {target_url}")]
    RouteMismatch {
        active_url: String,
        target_url: String,
        rerouted: bool,
    },

    #[error("composer did not appear within {waited_ms}ms")]
    ComposerMissing { waited_ms: u64 },

    #[error("page not ready to send after {waited_ms}ms")]
    SendNotReady {
        waited_ms: u64,
        has_composer: bool,
        indicator_visible: bool,
    },

    #[error("submit rejected by page after {attempts} attempt(s): {reason}")]
    DispatchRejected { reason: String, attempts: u32 },

    #[error("no dispatch signal after submit ({method})")]
    DispatchNotObserved {
        baseline: TurnMarker,
        last: TurnMarker,
        method: String,
    },

    #[error("prompt echo not confirmed after {attempts} attempt(s) in {elapsed_ms}ms")]
    EchoNotConfirmed {
        baseline: TurnMarker,
        last: TurnMarker,
        attempts: u32,
        elapsed_ms: u64,
    },

    #[error("assistant showed no activity within {waited_ms}ms")]
    ActivityTimeout {
        waited_ms: u64,
        last: TurnMarker,
        indicator_visible: bool,
    },

    #[error("reply did not finish within {elapsed_ms}ms (indicator visible: {indicator_visible})")]
    FinishTimeout {
        elapsed_ms: u64,
        last: TurnMarker,
        indicator_visible: bool,
    },

    #[error("soft reset ({reason}) failed at {step}: {detail}")]
    RecoveryFailed {
        reason: String,
        step: RecoveryStep,
        detail: String,
    },

    #[error("probe failed during {phase}: {source}")]
    Probe {
        phase: Phase,
        #[source]
        source: ProbeError,
    },
}

impl TurnError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TurnError::RouteMismatch { .. } => ErrorCode::RouteMismatch,
            TurnError::ComposerMissing { .. } | TurnError::SendNotReady { .. } => {
                ErrorCode::UiNotReady
            }
            TurnError::DispatchRejected { .. } => ErrorCode::SendButtonDisabled,
            TurnError::DispatchNotObserved { .. } => ErrorCode::DispatchNotObserved,
            TurnError::EchoNotConfirmed { .. } => ErrorCode::PromptNotConfirmedNoResend,
            TurnError::ActivityTimeout { .. } => ErrorCode::AssistantNoStart,
            TurnError::FinishTimeout {
                indicator_visible: true,
                ..
            } => ErrorCode::AssistantStuck,
            TurnError::FinishTimeout { .. } => ErrorCode::TimeoutBudget,
            TurnError::RecoveryFailed { .. } => ErrorCode::SoftResetFailed,
            TurnError::Probe { source, .. } => match source {
                ProbeError::Timeout(_) => ErrorCode::CdpCallTimeout,
                ProbeError::Script(_) => ErrorCode::PageScriptFailed,
                ProbeError::Contract(_) => ErrorCode::SelectorDrift,
                ProbeError::Transport(_) => ErrorCode::CdpDown,
            },
        }
    }

    pub fn spec(&self) -> ErrorSpec {
        resolve(self.code())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TurnError::ActivityTimeout { .. } | TurnError::FinishTimeout { .. }
        ) || matches!(self, TurnError::Probe { source, .. } if source.is_timeout())
    }

    /// Structured evidence keyed like the registry's `expectedEvidence`.
    pub fn evidence(&self) -> Value {
        let mut out = Map::new();
        let mut put = |key: &str, value: Value| {
            out.insert(key.to_string(), value);
        };
        match self {
            TurnError::RouteMismatch {
                active_url,
                target_url,
                rerouted,
            } => {
                put("active_url", json!(active_url));
                put("target_url", json!(target_url));
                put("route_probe", json!({ "rerouted": rerouted }));
            }
            TurnError::ComposerMissing { waited_ms } => {
                put("ui_probe", json!({ "has_composer": false, "waited_ms": waited_ms }));
            }
            TurnError::SendNotReady {
                waited_ms,
                has_composer,
                indicator_visible,
            } => {
                put(
                    "ui_probe",
                    json!({
                        "has_composer": has_composer,
                        "indicator_visible": indicator_visible,
                        "waited_ms": waited_ms,
                    }),
                );
            }
            TurnError::DispatchRejected { reason, attempts } => {
                put("ui_probe", json!({ "reason": reason, "attempts": attempts }));
            }
            TurnError::DispatchNotObserved {
                baseline,
                last,
                method,
            } => {
                put("baseline_markers", json!(baseline));
                put("last_markers", json!(last));
                put("submit_method", json!(method));
            }
            TurnError::EchoNotConfirmed {
                baseline,
                last,
                attempts,
                elapsed_ms,
            } => {
                put(
                    "ops_snapshot",
                    json!({
                        "baseline_markers": baseline,
                        "last_markers": last,
                        "attempts": attempts,
                        "elapsed_ms": elapsed_ms,
                    }),
                );
            }
            TurnError::ActivityTimeout {
                waited_ms,
                last,
                indicator_visible,
            } => {
                put(
                    "assistant_markers",
                    json!({
                        "assistant_count": last.assistant_count,
                        "assistant_signature": last.assistant_signature,
                        "indicator_visible": indicator_visible,
                    }),
                );
                put("last_markers", json!(last));
                put("stage_timing", json!({ "waited_ms": waited_ms }));
            }
            TurnError::FinishTimeout {
                elapsed_ms,
                last,
                indicator_visible,
            } => {
                put("stop_visible", json!(indicator_visible));
                put("stage_timing", json!({ "elapsed_ms": elapsed_ms }));
                put("last_markers", json!(last));
                put(
                    "assistant_markers",
                    json!({
                        "assistant_count": last.assistant_count,
                        "assistant_signature": last.assistant_signature,
                    }),
                );
            }
            TurnError::RecoveryFailed {
                reason,
                step,
                detail,
            } => {
                put(
                    "recovery_markers",
                    json!({ "reason": reason, "step": step, "detail": detail }),
                );
            }
            TurnError::Probe { phase, source } => {
                put("phase", json!(phase));
                match source {
                    ProbeError::Timeout(detail) => {
                        put("stage_timing", json!({ "detail": detail }));
                    }
                    ProbeError::Script(detail) => put("script_error", json!(detail)),
                    ProbeError::Contract(detail) => {
                        put("dom_markers", json!({ "detail": detail }));
                    }
                    ProbeError::Transport(detail) => {
                        put("cdp_probe", json!({ "detail": detail }));
                    }
                }
            }
        }
        Value::Object(out)
    }
}

/// Attaches the current phase to probe failures.
pub(crate) trait ProbeResultExt<T> {
    fn during(self, phase: Phase) -> Result<T, TurnError>;
}

impl<T> ProbeResultExt<T> for Result<T, ProbeError> {
    fn during(self, phase: Phase) -> Result<T, TurnError> {
        self.map_err(|source| TurnError::Probe { phase, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marker() -> TurnMarker {
        TurnMarker {
            user_count: 2,
            assistant_count: 1,
            user_signature: "u2".into(),
            assistant_signature: "a1".into(),
        }
    }

    #[test]
    fn finish_timeout_code_depends_on_indicator() {
        let stuck = TurnError::FinishTimeout {
            elapsed_ms: 90_000,
            last: marker(),
            indicator_visible: true,
        };
        let budget = TurnError::FinishTimeout {
            elapsed_ms: 90_000,
            last: marker(),
            indicator_visible: false,
        };
        assert_eq!(stuck.code(), ErrorCode::AssistantStuck);
        assert_eq!(budget.code(), ErrorCode::TimeoutBudget);
        assert!(stuck.is_timeout());
    }

    #[test]
    fn probe_errors_map_by_kind() {
        let cases = [
            (ProbeError::Timeout("t".into()), ErrorCode::CdpCallTimeout),
            (ProbeError::Script("s".into()), ErrorCode::PageScriptFailed),
            (ProbeError::Contract("c".into()), ErrorCode::SelectorDrift),
            (ProbeError::Transport("x".into()), ErrorCode::CdpDown),
        ];
        for (source, code) in cases {
            let err = Err::<(), _>(source).during(Phase::EchoVerify).unwrap_err();
            assert_eq!(err.code(), code);
            assert_eq!(err.evidence()["phase"], "ECHO_VERIFY");
        }
    }

    #[test]
    fn evidence_covers_registry_keys() {
        let errors = [
            TurnError::Probe {
                phase: Phase::Dispatch,
                source: ProbeError::Script("ReferenceError".into()),
            },
            TurnError::DispatchNotObserved {
                baseline: marker(),
                last: marker(),
                method: "click".into(),
            },
            TurnError::FinishTimeout {
                elapsed_ms: 1,
                last: marker(),
                indicator_visible: false,
            },
            TurnError::FinishTimeout {
                elapsed_ms: 1,
                last: marker(),
                indicator_visible: true,
            },
            TurnError::ActivityTimeout {
                waited_ms: 45_000,
                last: marker(),
                indicator_visible: false,
            },
        ];
        for err in errors {
            let evidence = err.evidence();
            for key in err.spec().expected_evidence {
                assert!(evidence.get(*key).is_some(), "{} lacks {key}", err.code());
            }
        }
    }

    #[test]
    fn markers_serialize_into_evidence() {
        let err = TurnError::DispatchNotObserved {
            baseline: marker(),
            last: marker(),
            method: "enter".into(),
        };
        assert_eq!(err.evidence()["last_markers"]["user_signature"], "u2");
        assert_eq!(err.to_string(), "no dispatch signal after submit (enter)");
    }
}
