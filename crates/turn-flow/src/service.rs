use std::sync::Arc;
use std::time::Duration;

use chatturn_core_types::PageProbe;
use error_taxonomy::ErrorSpec;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::condition::{Phase, ProbeResultExt, TurnError};
use crate::config::TurnConfig;
use crate::guard::{RouteGuard, TurnTarget};
use crate::inspect::{self, ReplyReadiness, TranscriptTail, UiContractReport};
use crate::machine::TurnRun;
use crate::outcome::{DispatchReceipt, PrecheckOutcome, TurnOutcome};
use crate::recovery::{self, RecoveryReport};

const INSPECT_BUDGET: Duration = Duration::from_secs(30);

/// Entry point for chat turns against one page.
///
/// Every call starts from a fresh read of the page; nothing observed by an earlier
/// call is trusted.
pub struct TurnService<P: ?Sized> {
    probe: Arc<P>,
    config: TurnConfig,
}

impl<P: PageProbe + ?Sized> TurnService<P> {
    pub fn new(probe: Arc<P>, config: TurnConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn probe(&self) -> &Arc<P> {
        &self.probe
    }

    fn run<'a>(&'a self, target: &'a TurnTarget, prompt: &'a str, timeout: Duration) -> TurnRun<'a, P> {
        TurnRun::new(&*self.probe, &self.config, target, prompt, timeout)
    }

    /// Sends `prompt` unless it is already the last user turn, then waits for the reply.
    pub async fn send_and_wait(
        &self,
        target: &TurnTarget,
        prompt: &str,
        timeout: Duration,
    ) -> Result<TurnOutcome, TurnError> {
        info!(
            target: "turn-flow",
            url = target.url(),
            chars = prompt.chars().count(),
            timeout_ms = timeout.as_millis() as u64,
            "turn starting"
        );
        let result = self.run(target, prompt, timeout).send_and_wait().await;
        match &result {
            Ok(outcome) => info!(
                target: "turn-flow",
                confirmation = ?outcome.confirmation,
                reused = outcome.reused,
                total_ms = outcome.timings.total_ms,
                "turn finished"
            ),
            Err(err) => warn!(target: "turn-flow", code = %err.code(), %err, "turn failed"),
        }
        result
    }

    /// Delivers `prompt` and returns without waiting for the reply.
    pub async fn send_and_confirm(
        &self,
        target: &TurnTarget,
        prompt: &str,
        timeout: Duration,
    ) -> Result<DispatchReceipt, TurnError> {
        let result = self.run(target, prompt, timeout).send_and_confirm().await;
        if let Err(err) = &result {
            warn!(target: "turn-flow", code = %err.code(), %err, "dispatch failed");
        }
        result
    }

    /// Returns the reply to `prompt` if it is already on the page. Never sends.
    pub async fn precheck_reuse(
        &self,
        target: &TurnTarget,
        prompt: &str,
        timeout: Duration,
    ) -> Result<PrecheckOutcome, TurnError> {
        self.run(target, prompt, timeout).precheck().await
    }

    /// Cheap check: on the right conversation, composer present and nothing generating.
    pub async fn probe_ready_for_send(&self, target: &TurnTarget) -> Result<bool, TurnError> {
        let snapshot = self.probe.read_state().await.during(Phase::Inspect)?;
        if !target.matches(&snapshot.url) {
            return Ok(false);
        }
        let composer = self.probe.is_composer_present().await.during(Phase::Inspect)?;
        if !composer {
            return Ok(false);
        }
        let generating = RouteGuard::new(&*self.probe, &self.config)
            .is_generation_in_progress()
            .await?;
        Ok(!generating)
    }

    /// Runs one soft reset. Failures are logged and reported as `false`.
    pub async fn soft_reset(&self, target: &TurnTarget, reason: &str) -> bool {
        self.try_soft_reset(target, reason).await.is_ok()
    }

    pub async fn try_soft_reset(
        &self,
        target: &TurnTarget,
        reason: &str,
    ) -> Result<RecoveryReport, TurnError> {
        let deadline = Instant::now() + self.config.recovery_timeout();
        recovery::soft_reset(&*self.probe, &self.config, target, reason, deadline).await
    }

    pub async fn reply_ready_probe(
        &self,
        target: &TurnTarget,
        prompt: &str,
    ) -> Result<ReplyReadiness, TurnError> {
        inspect::reply_ready(self.run(target, prompt, INSPECT_BUDGET), prompt).await
    }

    pub async fn probe_ui_contract(&self, target: &TurnTarget) -> Result<UiContractReport, TurnError> {
        inspect::ui_contract(
            &*self.probe,
            &self.config,
            target,
            Instant::now() + INSPECT_BUDGET,
        )
        .await
    }

    /// Last `limit` turns of the conversation (clamped to 1..=50).
    pub async fn fetch_last(&self, target: &TurnTarget, limit: usize) -> Result<TranscriptTail, TurnError> {
        inspect::fetch_last(
            &*self.probe,
            &self.config,
            target,
            limit,
            Instant::now() + INSPECT_BUDGET,
        )
        .await
    }

    pub fn resolve_error_spec(&self, code: &str) -> Option<ErrorSpec> {
        error_taxonomy::resolve_error_spec(code)
    }
}
