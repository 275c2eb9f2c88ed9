//! Soft reset: reload the page and re-establish route and readiness.

use std::time::Duration;

use chatturn_core_types::PageProbe;
use error_taxonomy::ErrorCode;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::condition::{RecoveryStep, TurnError};
use crate::config::TurnConfig;
use crate::guard::{RouteGuard, TurnTarget};
use crate::poll::{deadline_within, poll_until, Poller};

const LOAD_POLL: Duration = Duration::from_millis(200);
const LOAD_WAIT: Duration = Duration::from_secs(10);
const SEND_READY_CAP: Duration = Duration::from_secs(90);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub reason: String,
    pub rerouted: bool,
    /// The indicator was still visible, but stale, once the page came back.
    pub stale_indicator: bool,
    pub elapsed_ms: u64,
}

/// Foreground and reload are best-effort; route, composer and readiness must succeed.
/// Safe to run repeatedly; nothing from before the reload is trusted.
pub async fn soft_reset<P: PageProbe + ?Sized>(
    probe: &P,
    config: &TurnConfig,
    target: &TurnTarget,
    reason: &str,
    deadline: Instant,
) -> Result<RecoveryReport, TurnError> {
    let started = Instant::now();
    let deadline = deadline_within(config.recovery_timeout(), deadline);
    info!(target: "soft-reset", reason, url = target.url(), "soft reset starting");

    if let Err(err) = probe.bring_to_front().await {
        warn!(target: "soft-reset", %err, "bring to front failed");
    }
    if let Err(err) = probe.reload().await {
        warn!(target: "soft-reset", %err, "reload failed");
    }

    let load_poller = Poller::new(deadline_within(LOAD_WAIT, deadline), LOAD_POLL);
    let loaded = poll_until(load_poller, || async move {
        match probe.ready_state().await {
            Ok(state) => Ok::<_, TurnError>((state == "complete").then_some(())),
            Err(err) => {
                debug!(target: "soft-reset", %err, "ready state probe failed");
                Ok(None)
            }
        }
    })
    .await?;
    if loaded.is_none() {
        warn!(target: "soft-reset", "page did not report load complete");
    }

    let fail = |step: RecoveryStep, err: TurnError| {
        let failed = TurnError::RecoveryFailed {
            reason: reason.to_string(),
            step,
            detail: err.to_string(),
        };
        error!(target: "soft-reset", code = %failed.code(), %step, %err, "soft reset failed");
        failed
    };

    let mut guard = RouteGuard::new(probe, config);
    let route = guard
        .ensure_route(target, deadline)
        .await
        .map_err(|err| fail(RecoveryStep::Route, err))?;
    guard
        .wait_for_composer(deadline_within(config.composer_timeout(), deadline))
        .await
        .map_err(|err| fail(RecoveryStep::Composer, err))?;
    let ready = guard
        .wait_until_send_ready(deadline_within(
            config.send_ready_timeout().min(SEND_READY_CAP),
            deadline,
        ))
        .await
        .map_err(|err| fail(RecoveryStep::SendReady, err))?;

    let report = RecoveryReport {
        reason: reason.to_string(),
        rerouted: route.rerouted,
        stale_indicator: ready.stale_indicator,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        target: "soft-reset",
        code = %ErrorCode::SoftResetApplied,
        reason,
        elapsed_ms = report.elapsed_ms,
        stale_indicator = report.stale_indicator,
        "soft reset applied"
    );
    Ok(report)
}
