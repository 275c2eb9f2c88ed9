use cdp_adapter::AdapterError;
use serde_json::{json, Value};
use thiserror::Error;
use turn_flow::{ErrorCode, TurnError};

/// Setup failures that happen before a page is attached.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("no browser tab matches {url} ({tabs} page target(s) open)")]
    TargetUnresolved { url: String, tabs: usize },

    #[error("devtools endpoint {endpoint} unreachable: {source}")]
    DevtoolsUnreachable {
        endpoint: String,
        #[source]
        source: AdapterError,
    },
}

impl CliError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CliError::TargetUnresolved { .. } => ErrorCode::TargetUnresolved,
            CliError::DevtoolsUnreachable { .. } => ErrorCode::CdpDown,
        }
    }
}

/// Process exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Ok,
    Routing,
    Dispatch,
    Timeout,
    Other,
    DevtoolsDown,
    /// A probe or precheck answered "no".
    Negative,
    GenerationInProgress,
    ContractFailed,
}

impl Exit {
    pub fn status(self) -> u8 {
        match self {
            Exit::Ok => 0,
            Exit::Routing => 2,
            Exit::Dispatch => 3,
            Exit::Timeout => 4,
            Exit::Other => 5,
            Exit::DevtoolsDown => 6,
            Exit::Negative => 10,
            Exit::GenerationInProgress => 11,
            Exit::ContractFailed => 22,
        }
    }

    pub fn for_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::RouteMismatch | ErrorCode::TargetUnresolved | ErrorCode::NewChatGuard => {
                Exit::Routing
            }
            ErrorCode::UiNotReady
            | ErrorCode::SendButtonDisabled
            | ErrorCode::DispatchNotObserved
            | ErrorCode::PromptNotConfirmedNoResend
            | ErrorCode::SendRetryVetoIntraRun => Exit::Dispatch,
            ErrorCode::TimeoutBudget
            | ErrorCode::AssistantNoStart
            | ErrorCode::AssistantStuck
            | ErrorCode::CdpCallTimeout
            | ErrorCode::CdpTimeoutRetry
            | ErrorCode::SoftResetFailed => Exit::Timeout,
            ErrorCode::CdpDown => Exit::DevtoolsDown,
            ErrorCode::UiContractFail => Exit::ContractFailed,
            _ => Exit::Other,
        }
    }
}

/// Exit status, code and evidence for a failed command.
pub fn classify(err: &anyhow::Error) -> (Exit, Option<ErrorCode>, Value) {
    for cause in err.chain() {
        if let Some(turn) = cause.downcast_ref::<TurnError>() {
            return (Exit::for_code(turn.code()), Some(turn.code()), turn.evidence());
        }
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            let evidence = match cli {
                CliError::TargetUnresolved { url, tabs } => json!({ "target_url": url, "tabs": tabs }),
                CliError::DevtoolsUnreachable { endpoint, .. } => json!({ "endpoint": endpoint }),
            };
            return (Exit::for_code(cli.code()), Some(cli.code()), evidence);
        }
    }
    (Exit::Other, None, Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::AdapterErrorKind;
    use chatturn_core_types::{ProbeError, TurnMarker};
    use pretty_assertions::assert_eq;
    use turn_flow::Phase;

    #[test]
    fn turn_errors_map_to_exit_groups() {
        let finish = TurnError::FinishTimeout {
            elapsed_ms: 1,
            last: TurnMarker::default(),
            indicator_visible: true,
        };
        let probe = TurnError::Probe {
            phase: Phase::Dispatch,
            source: ProbeError::Transport("closed".into()),
        };
        let echo = TurnError::EchoNotConfirmed {
            baseline: TurnMarker::default(),
            last: TurnMarker::default(),
            attempts: 2,
            elapsed_ms: 10,
        };

        let (exit, code, _) = classify(&anyhow::Error::new(finish));
        assert_eq!((exit.status(), code), (4, Some(ErrorCode::AssistantStuck)));
        let (exit, code, _) = classify(&anyhow::Error::new(probe));
        assert_eq!((exit.status(), code), (6, Some(ErrorCode::CdpDown)));
        let (exit, _, _) = classify(&anyhow::Error::new(echo));
        assert_eq!(exit, Exit::Dispatch);
    }

    #[test]
    fn context_wrapping_keeps_the_code() {
        let err = anyhow::Error::new(CliError::DevtoolsUnreachable {
            endpoint: "http://127.0.0.1:9222".into(),
            source: AdapterError::new(AdapterErrorKind::CdpIo),
        })
        .context("attaching to page");
        let (exit, code, evidence) = classify(&err);
        assert_eq!(exit.status(), 6);
        assert_eq!(code, Some(ErrorCode::CdpDown));
        assert_eq!(evidence["endpoint"], "http://127.0.0.1:9222");
    }

    #[test]
    fn missing_tab_is_a_routing_failure() {
        let err = anyhow::Error::new(CliError::TargetUnresolved {
            url: "https://chatgpt.com/c/abc".into(),
            tabs: 3,
        });
        let (exit, code, evidence) = classify(&err);
        assert_eq!(exit, Exit::Routing);
        assert_eq!(code, Some(ErrorCode::TargetUnresolved));
        assert_eq!(evidence["tabs"], 3);
    }

    #[test]
    fn unclassified_errors_are_other() {
        let (exit, code, _) = classify(&anyhow::anyhow!("boom"));
        assert_eq!(exit.status(), 5);
        assert_eq!(code, None);
    }
}
