//! Send/verify/wait state machine.
//!
//! Decisions are pure functions of the baseline snapshot, the current snapshot and the
//! attempt count; [`TurnRun`] only sequences probe calls, sleeps and recoveries around them.

use std::time::Duration;

use chatturn_core_types::{
    normalize_assistant_text, prompt_echo_matches, reply_fingerprint, stable_hash, tail_chars,
    ContentHash, PageProbe, PageSnapshot, ReplyAnchor,
};
use error_taxonomy::ErrorCode;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::condition::{Phase, ProbeResultExt, TurnError};
use crate::config::TurnConfig;
use crate::guard::{RouteGuard, TurnTarget};
use crate::outcome::{Confirmation, DispatchReceipt, PrecheckOutcome, TurnOutcome, TurnTimings};
use crate::poll::{deadline_within, poll_until, Heartbeat, Poller};
use crate::recovery::soft_reset;

const FOCUS_SETTLE: Duration = Duration::from_millis(300);
const LIGHT_READY_CAP: Duration = Duration::from_secs(30);
const RETRY_COMPOSER_CAP: Duration = Duration::from_secs(15);
const RETRY_READY_CAP: Duration = Duration::from_secs(60);
const STUCK_TAIL_CHARS: usize = 500;

/// First observable effect of a submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchSignal {
    UserTurn,
    AssistantTurn,
    Indicator,
}

pub fn dispatch_signal(baseline: &PageSnapshot, current: &PageSnapshot) -> Option<DispatchSignal> {
    if current.user_turn_count > baseline.user_turn_count
        || current.last_user_signature != baseline.last_user_signature
    {
        return Some(DispatchSignal::UserTurn);
    }
    if current.assistant_turn_count > baseline.assistant_turn_count
        || current.last_assistant_signature != baseline.last_assistant_signature
    {
        return Some(DispatchSignal::AssistantTurn);
    }
    if current.generation_indicator_visible && !baseline.generation_indicator_visible {
        return Some(DispatchSignal::Indicator);
    }
    None
}

/// The newest user turn is the prompt and is not the turn the baseline already had.
pub fn echo_confirmed(prompt: &str, baseline: &PageSnapshot, current: &PageSnapshot) -> bool {
    prompt_echo_matches(prompt, &current.last_user_text)
        && current.user_turn_count >= baseline.user_turn_count
        && (current.last_user_signature != baseline.last_user_signature
            || current.user_turn_count > baseline.user_turn_count)
}

/// Weaker delivery evidence used when the echo itself never rendered.
pub fn soft_signal(baseline: &PageSnapshot, current: &PageSnapshot) -> bool {
    current.user_turn_count > baseline.user_turn_count
        || current.last_user_signature != baseline.last_user_signature
        || (current.generation_indicator_visible && !baseline.generation_indicator_visible)
}

/// Anything that shows the assistant engaged since `baseline`.
///
/// With `anchored`, the baseline already holds the echoed prompt, so a non-empty reply
/// positioned after it counts even if it rendered before the baseline was taken.
pub fn activity_observed(baseline: &PageSnapshot, current: &PageSnapshot, anchored: bool) -> bool {
    current.user_turn_count > baseline.user_turn_count
        || current.last_user_signature != baseline.last_user_signature
        || current.assistant_turn_count > baseline.assistant_turn_count
        || current.last_assistant_signature != baseline.last_assistant_signature
        || current.generation_indicator_visible
        || (anchored && current.assistant_after_last_user && current.has_assistant_text())
}

/// The latest assistant turn can be the reply to this prompt.
///
/// Without an anchor the prompt's own user turn was never identified, so a reply that
/// was already on the page at `baseline` is a leftover from an earlier turn.
pub fn reply_positioned(baseline: &PageSnapshot, current: &PageSnapshot, anchored: bool) -> bool {
    if !current.assistant_after_last_user {
        return false;
    }
    anchored
        || current.assistant_turn_count > baseline.assistant_turn_count
        || current.last_assistant_signature != baseline.last_assistant_signature
}

/// `(signature, normalized text, count)` of the latest reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyMarker {
    signature: String,
    text: String,
    count: u32,
}

impl ReplyMarker {
    pub fn of(snapshot: &PageSnapshot) -> Self {
        Self {
            signature: snapshot.last_assistant_signature.clone(),
            text: normalize_assistant_text(&snapshot.last_assistant_text),
            count: snapshot.assistant_turn_count,
        }
    }
}

/// Counts consecutive identical reply markers.
#[derive(Debug, Default)]
pub struct StabilityTracker {
    last: Option<ReplyMarker>,
    repeats: u32,
}

impl StabilityTracker {
    /// Returns how many polls in a row matched the one before.
    pub fn observe(&mut self, marker: ReplyMarker) -> u32 {
        if self.last.as_ref() == Some(&marker) {
            self.repeats += 1;
        } else {
            self.last = Some(marker);
            self.repeats = 0;
        }
        self.repeats
    }

    /// Unchanged across two consecutive polls.
    pub fn settled(&self) -> bool {
        self.repeats >= 2
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.repeats = 0;
    }
}

/// How long the reply has sat unchanged while the indicator stayed up.
#[derive(Debug, Default)]
pub struct StuckTracker {
    marker: Option<(String, ContentHash, u32)>,
    since: Option<Instant>,
}

impl StuckTracker {
    pub fn observe(&mut self, snapshot: &PageSnapshot, now: Instant) -> Duration {
        let normalized = normalize_assistant_text(&snapshot.last_assistant_text);
        let tail = tail_chars(&normalized, STUCK_TAIL_CHARS);
        let marker = (
            snapshot.last_assistant_signature.clone(),
            stable_hash(&tail),
            snapshot.assistant_turn_count,
        );
        if self.marker.as_ref() == Some(&marker) {
            if let Some(since) = self.since {
                return now.saturating_duration_since(since);
            }
        }
        self.marker = Some(marker);
        self.since = Some(now);
        Duration::ZERO
    }

    pub fn reset(&mut self) {
        self.marker = None;
        self.since = None;
    }
}

/// What a fresh look at the page says about a prompt that may already be there.
#[derive(Debug)]
pub(crate) enum ReuseProbe {
    NotEchoed(PageSnapshot),
    Reused { text: String, snapshot: PageSnapshot },
    InProgress(PageSnapshot),
    NotAnswered(PageSnapshot),
}

enum Dispatched {
    Confirmed {
        snapshot: PageSnapshot,
        confirmation: Confirmation,
        anchored: bool,
    },
    Reused {
        text: String,
        snapshot: PageSnapshot,
    },
}

enum DupCheck {
    Reused { text: String, snapshot: PageSnapshot },
    Wait(PageSnapshot),
    Send(PageSnapshot),
}

/// One invocation against one page. Holds no state across invocations.
pub(crate) struct TurnRun<'a, P: ?Sized> {
    probe: &'a P,
    config: &'a TurnConfig,
    target: &'a TurnTarget,
    prompt: &'a str,
    started: Instant,
    deadline: Instant,
    phase: Phase,
    warnings: Vec<ErrorCode>,
}

impl<'a, P: PageProbe + ?Sized> TurnRun<'a, P> {
    pub(crate) fn new(
        probe: &'a P,
        config: &'a TurnConfig,
        target: &'a TurnTarget,
        prompt: &'a str,
        timeout: Duration,
    ) -> Self {
        let started = Instant::now();
        Self {
            probe,
            config,
            target,
            prompt,
            started,
            deadline: started + timeout,
            phase: Phase::IdleGate,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(
                target: "turn-flow",
                from = %self.phase,
                to = %phase,
                elapsed_ms = self.elapsed_ms(),
                "phase"
            );
            self.phase = phase;
        }
    }

    pub(crate) fn target(&self) -> &'a TurnTarget {
        self.target
    }

    pub(crate) fn config(&self) -> &'a TurnConfig {
        self.config
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn record(&mut self, code: ErrorCode, message: &str) {
        warn!(target: "turn-flow", code = %code, phase = %self.phase, "{message}");
        if !self.warnings.contains(&code) {
            self.warnings.push(code);
        }
    }

    pub(crate) fn guard(&self) -> RouteGuard<'a, P> {
        RouteGuard::new(self.probe, self.config)
    }

    pub(crate) async fn read(&self) -> Result<PageSnapshot, TurnError> {
        self.probe.read_state().await.during(self.phase)
    }

    async fn soft_reset(&self, reason: &str) -> Result<crate::recovery::RecoveryReport, TurnError> {
        soft_reset(self.probe, self.config, self.target, reason, self.deadline).await
    }

    /// Route, composer and readiness; clears a stale indicator before anything is sent.
    async fn idle_gate(&mut self) -> Result<(), TurnError> {
        self.enter(Phase::IdleGate);
        let mut guard = self.guard();
        guard.ensure_route(self.target, self.deadline).await?;
        guard
            .wait_for_composer(deadline_within(self.config.composer_timeout(), self.deadline))
            .await?;
        let ready = guard
            .wait_until_send_ready(deadline_within(self.config.send_ready_timeout(), self.deadline))
            .await?;
        if !ready.stale_indicator {
            return Ok(());
        }

        let stop = match self.probe.click_stop_control().await {
            Ok(ack) => ack,
            Err(err) => {
                warn!(target: "turn-flow", %err, "stop control click failed");
                Default::default()
            }
        };
        if stop.clicked {
            let cleared = guard
                .wait_indicator_hidden(deadline_within(
                    self.config.pre_send_idle_timeout(),
                    self.deadline,
                ))
                .await?;
            if cleared {
                info!(target: "turn-flow", "stale indicator cleared by stop control");
                return Ok(());
            }
        }

        let report = self.soft_reset("pre_send_indicator_stuck").await?;
        if report.stale_indicator {
            self.record(
                ErrorCode::StaleIndicatorIdle,
                "indicator survived soft reset, proceeding as idle",
            );
        }
        Ok(())
    }

    /// Waits for the reply after the anchored prompt to hold still for `quiet`.
    /// Returns whether it settled, plus the last snapshot seen.
    pub(crate) async fn wait_settled_after_anchor(
        &self,
        quiet: Duration,
        budget: Duration,
    ) -> Result<(bool, PageSnapshot), TurnError> {
        let poller = Poller::new(
            deadline_within(budget, self.deadline),
            self.config.stability_poll(),
        );
        let mut quiet_from: Option<(ReplyMarker, Instant)> = None;
        loop {
            let snapshot = self.read().await?;
            let candidate = prompt_echo_matches(self.prompt, &snapshot.last_user_text)
                && snapshot.assistant_after_last_user
                && snapshot.has_assistant_text()
                && !snapshot.generation_indicator_visible;
            if candidate {
                let marker = ReplyMarker::of(&snapshot);
                let unchanged_since = match &quiet_from {
                    Some((last, since)) if *last == marker => Some(*since),
                    _ => None,
                };
                match unchanged_since {
                    Some(since) if since.elapsed() >= quiet => return Ok((true, snapshot)),
                    Some(_) => {}
                    None => quiet_from = Some((marker, Instant::now())),
                }
            } else {
                quiet_from = None;
            }
            if !poller.tick().await {
                return Ok((false, snapshot));
            }
        }
    }

    /// Classifies `snapshot` against the prompt. Never sends anything.
    pub(crate) async fn reuse_probe(
        &self,
        snapshot: PageSnapshot,
        quiet: Duration,
        budget: Duration,
    ) -> Result<ReuseProbe, TurnError> {
        if !prompt_echo_matches(self.prompt, &snapshot.last_user_text) {
            return Ok(ReuseProbe::NotEchoed(snapshot));
        }
        if snapshot.assistant_after_last_user && snapshot.has_assistant_text() {
            let (settled, last) = self.wait_settled_after_anchor(quiet, budget).await?;
            if settled {
                return Ok(ReuseProbe::Reused {
                    text: last.last_assistant_text.trim().to_string(),
                    snapshot: last,
                });
            }
            return Ok(ReuseProbe::InProgress(last));
        }
        if snapshot.generation_indicator_visible {
            return Ok(ReuseProbe::InProgress(snapshot));
        }
        Ok(ReuseProbe::NotAnswered(snapshot))
    }

    async fn dup_check(&mut self) -> Result<DupCheck, TurnError> {
        self.enter(Phase::DupCheck);
        let baseline = self.read().await?;
        if !prompt_echo_matches(self.prompt, &baseline.last_user_text) {
            return Ok(DupCheck::Send(baseline));
        }
        info!(
            target: "turn-flow",
            user = baseline.user_turn_count,
            asst = baseline.assistant_turn_count,
            "prompt is already the last user turn, not dispatching"
        );
        let probe = self
            .reuse_probe(
                baseline,
                self.config.reuse_stability(),
                self.config.reuse_stability_cap(),
            )
            .await?;
        Ok(match probe {
            ReuseProbe::Reused { text, snapshot } => DupCheck::Reused { text, snapshot },
            ReuseProbe::InProgress(snapshot) | ReuseProbe::NotAnswered(snapshot) => {
                DupCheck::Wait(snapshot)
            }
            ReuseProbe::NotEchoed(snapshot) => DupCheck::Send(snapshot),
        })
    }

    async fn wait_dispatch_signal(
        &self,
        baseline: &PageSnapshot,
    ) -> Result<Option<DispatchSignal>, TurnError> {
        let poller = Poller::new(
            deadline_within(self.config.dispatch_verify(), self.deadline),
            self.config.verify_poll(),
        );
        let probe = self.probe;
        let phase = self.phase;
        poll_until(poller, || async move {
            let snapshot = probe.read_state().await.during(phase)?;
            Ok::<_, TurnError>(dispatch_signal(baseline, &snapshot))
        })
        .await
    }

    async fn wait_echo(
        &self,
        baseline: &PageSnapshot,
        budget: Duration,
    ) -> Result<Option<PageSnapshot>, TurnError> {
        let poller = Poller::new(deadline_within(budget, self.deadline), self.config.echo_poll());
        let probe = self.probe;
        let prompt = self.prompt;
        poll_until(poller, || async move {
            let snapshot = probe.read_state().await.during(Phase::EchoVerify)?;
            Ok::<_, TurnError>(echo_confirmed(prompt, baseline, &snapshot).then_some(snapshot))
        })
        .await
    }

    /// DISPATCH through ECHO_VERIFY, with one recovery escalation and at most
    /// `max_dispatch_attempts` submits.
    async fn dispatch(&mut self, baseline: PageSnapshot) -> Result<Dispatched, TurnError> {
        let started = Instant::now();
        let send_baseline = baseline.clone();
        let mut baseline = baseline;
        let max_attempts = self.config.max_dispatch_attempts();
        let mut escalated = false;
        let mut last_seen: Option<PageSnapshot> = None;
        let mut attempt = 0;

        while attempt < max_attempts {
            attempt += 1;
            self.enter(Phase::Dispatch);
            let ack = self
                .probe
                .submit_prompt(self.prompt)
                .await
                .during(Phase::Dispatch)?;
            if !ack.accepted {
                let reason = ack
                    .error
                    .unwrap_or_else(|| "submit not accepted".to_string());
                warn!(target: "turn-flow", attempt, %reason, "page rejected submit");
                if attempt < max_attempts {
                    self.guard()
                        .wait_for_composer(deadline_within(RETRY_COMPOSER_CAP, self.deadline))
                        .await?;
                    continue;
                }
                return Err(TurnError::DispatchRejected {
                    reason,
                    attempts: attempt,
                });
            }
            let mut method = ack.method.unwrap_or_else(|| "click".to_string());

            self.enter(Phase::DispatchVerify);
            let mut signal = self.wait_dispatch_signal(&baseline).await?;
            if signal.is_none() {
                debug!(target: "turn-flow", "no dispatch signal, pressing submit key");
                let key = self
                    .probe
                    .press_submit_key()
                    .await
                    .during(Phase::DispatchVerify)?;
                if key.accepted {
                    method = "enter".to_string();
                    signal = self.wait_dispatch_signal(&baseline).await?;
                }
            }
            let Some(signal) = signal else {
                let last = self.read().await?;
                let err = TurnError::DispatchNotObserved {
                    baseline: baseline.marker(),
                    last: last.marker(),
                    method,
                };
                warn!(target: "turn-flow", code = %err.code(), "{err}");
                return Err(err);
            };
            info!(target: "turn-flow", attempt, ?signal, %method, "dispatch observed");
            last_seen = Some(self.read().await?);

            self.enter(Phase::EchoVerify);
            if let Some(snapshot) = self.wait_echo(&baseline, self.config.echo_verify()).await? {
                return Ok(self.confirmed(snapshot));
            }

            warn!(target: "turn-flow", attempt, "echo not observed, refocusing composer");
            if let Err(err) = self.probe.focus_composer().await {
                debug!(target: "turn-flow", %err, "focus failed");
            }
            sleep(FOCUS_SETTLE).await;
            if let Err(err) = self
                .guard()
                .wait_until_send_ready(deadline_within(LIGHT_READY_CAP, self.deadline))
                .await
            {
                debug!(target: "turn-flow", %err, "readiness after refocus failed");
            }
            if let Some(snapshot) = self.wait_echo(&baseline, self.config.echo_recheck()).await? {
                return Ok(self.confirmed(snapshot));
            }

            if !escalated {
                escalated = true;
                match self.soft_reset("echo_not_confirmed").await {
                    Ok(_) => {
                        self.enter(Phase::DupCheck);
                        let snapshot = self.read().await?;
                        match self
                            .reuse_probe(
                                snapshot,
                                self.config.reuse_stability(),
                                self.config.reuse_stability_cap(),
                            )
                            .await?
                        {
                            ReuseProbe::Reused { text, snapshot } => {
                                info!(target: "turn-flow", "prompt answered before echo was seen");
                                return Ok(Dispatched::Reused { text, snapshot });
                            }
                            ReuseProbe::InProgress(snapshot) | ReuseProbe::NotAnswered(snapshot) => {
                                return Ok(self.confirmed(snapshot));
                            }
                            ReuseProbe::NotEchoed(_) => {
                                debug!(target: "turn-flow", "prompt absent after soft reset");
                            }
                        }
                    }
                    Err(err) => {
                        warn!(target: "turn-flow", code = %err.code(), %err, "echo recovery failed");
                    }
                }
            }

            if attempt < max_attempts {
                self.enter(Phase::IdleGate);
                let mut guard = self.guard();
                guard
                    .wait_for_composer(deadline_within(RETRY_COMPOSER_CAP, self.deadline))
                    .await?;
                guard
                    .wait_until_send_ready(deadline_within(RETRY_READY_CAP, self.deadline))
                    .await?;
                baseline = self.read().await?;
                info!(target: "turn-flow", attempt = attempt + 1, "retrying dispatch");
            }
        }

        self.enter(Phase::EchoVerify);
        if let Some(last) = &last_seen {
            if soft_signal(&send_baseline, last) {
                self.record(
                    ErrorCode::PostsendEchoSoft,
                    "echo never rendered, continuing on weaker delivery signal",
                );
                return Ok(Dispatched::Confirmed {
                    snapshot: baseline,
                    confirmation: Confirmation::Soft,
                    anchored: false,
                });
            }
        }
        let err = TurnError::EchoNotConfirmed {
            baseline: send_baseline.marker(),
            last: last_seen.map(|s| s.marker()).unwrap_or_default(),
            attempts: attempt,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        warn!(target: "turn-flow", code = %err.code(), "{err}");
        Err(err)
    }

    fn confirmed(&self, snapshot: PageSnapshot) -> Dispatched {
        info!(
            target: "turn-flow",
            user = snapshot.user_turn_count,
            asst = snapshot.assistant_turn_count,
            elapsed_ms = self.elapsed_ms(),
            "prompt echo confirmed"
        );
        Dispatched::Confirmed {
            snapshot,
            confirmation: Confirmation::Strict,
            anchored: true,
        }
    }

    /// REPLY_WAIT_ACTIVITY then REPLY_WAIT_STABLE. Returns the trimmed reply text and the
    /// snapshot it was read from.
    pub(crate) async fn wait_for_reply(
        &mut self,
        baseline: PageSnapshot,
        anchored: bool,
    ) -> Result<(String, PageSnapshot), TurnError> {
        let origin = baseline.clone();
        let mut baseline = baseline;
        let wait_started = Instant::now();
        let mut heartbeat = Heartbeat::new(self.config.heartbeat());
        let mut saw_indicator = false;

        self.enter(Phase::ReplyWaitActivity);
        let activity = Poller::new(
            deadline_within(self.config.activity_timeout(), self.deadline),
            self.config.poll_interval(),
        );
        loop {
            let snapshot = self.read().await?;
            saw_indicator |= snapshot.generation_indicator_visible;
            if activity_observed(&baseline, &snapshot, anchored) {
                debug!(
                    target: "turn-flow",
                    user = snapshot.user_turn_count,
                    asst = snapshot.assistant_turn_count,
                    indicator = snapshot.generation_indicator_visible,
                    "assistant activity observed"
                );
                break;
            }
            if heartbeat.due() {
                info!(
                    target: "turn-flow",
                    phase = %self.phase,
                    elapsed_ms = wait_started.elapsed().as_millis() as u64,
                    "waiting for assistant to start"
                );
            }
            if !activity.tick().await {
                let err = TurnError::ActivityTimeout {
                    waited_ms: wait_started.elapsed().as_millis() as u64,
                    last: snapshot.marker(),
                    indicator_visible: snapshot.generation_indicator_visible,
                };
                warn!(target: "turn-flow", code = %err.code(), "{err}");
                return Err(err);
            }
        }

        self.enter(Phase::ReplyWaitStable);
        let poller = Poller::new(self.deadline, self.config.poll_interval());
        let mut stability = StabilityTracker::default();
        let mut stuck = StuckTracker::default();
        let mut recovered = false;
        let mut changed = false;
        let mut last_text = String::new();

        loop {
            let snapshot = self.read().await?;

            if snapshot.generation_indicator_visible {
                saw_indicator = true;
                let stuck_for = stuck.observe(&snapshot, Instant::now());
                if stuck_for >= self.config.reply_stuck() && !recovered {
                    recovered = true;
                    warn!(
                        target: "turn-flow",
                        stuck_ms = stuck_for.as_millis() as u64,
                        "reply unchanged with indicator visible, soft reset"
                    );
                    match self.soft_reset("reply_stuck_indicator_visible").await {
                        Ok(_) => {
                            let fresh = self.read().await?;
                            baseline.assistant_turn_count = fresh.assistant_turn_count;
                            baseline.last_assistant_signature = fresh.last_assistant_signature;
                            stuck.reset();
                            stability.reset();
                        }
                        Err(err) => {
                            warn!(target: "turn-flow", code = %err.code(), %err, "recovery during reply wait failed");
                        }
                    }
                }
            } else {
                stuck.reset();
            }

            changed |= snapshot.assistant_turn_count > baseline.assistant_turn_count
                || snapshot.last_assistant_signature != baseline.last_assistant_signature
                || snapshot.last_user_signature != baseline.last_user_signature;
            if !snapshot.last_assistant_text.is_empty() {
                last_text = snapshot.last_assistant_text.clone();
            }
            stability.observe(ReplyMarker::of(&snapshot));

            let anchored_reply = anchored && snapshot.assistant_after_last_user;
            let progressed = changed || saw_indicator || anchored_reply;
            let positioned = reply_positioned(&origin, &snapshot, anchored);
            if !snapshot.generation_indicator_visible
                && stability.settled()
                && progressed
                && positioned
                && !last_text.is_empty()
            {
                let text = if snapshot.last_assistant_text.is_empty() {
                    last_text
                } else {
                    snapshot.last_assistant_text.clone()
                };
                info!(
                    target: "turn-flow",
                    chars = text.chars().count(),
                    elapsed_ms = wait_started.elapsed().as_millis() as u64,
                    "reply complete"
                );
                return Ok((text.trim().to_string(), snapshot));
            }

            if heartbeat.due() {
                info!(
                    target: "turn-flow",
                    phase = %self.phase,
                    elapsed_ms = wait_started.elapsed().as_millis() as u64,
                    asst = snapshot.assistant_turn_count,
                    indicator = snapshot.generation_indicator_visible,
                    chars = snapshot.last_assistant_text.chars().count(),
                    "waiting for reply to finish"
                );
            }

            if !poller.tick().await {
                let err = TurnError::FinishTimeout {
                    elapsed_ms: wait_started.elapsed().as_millis() as u64,
                    last: snapshot.marker(),
                    indicator_visible: snapshot.generation_indicator_visible,
                };
                warn!(target: "turn-flow", code = %err.code(), "{err}");
                return Err(err);
            }
        }
    }

    fn outcome(
        self,
        text: String,
        snapshot: &PageSnapshot,
        confirmation: Confirmation,
        reused: bool,
        timings: TurnTimings,
    ) -> TurnOutcome {
        TurnOutcome {
            fingerprint: reply_fingerprint(self.prompt, snapshot),
            anchor: ReplyAnchor::from_snapshot(snapshot),
            text,
            confirmation,
            reused,
            warnings: self.warnings,
            timings: TurnTimings {
                total_ms: self.started.elapsed().as_millis() as u64,
                ..timings
            },
        }
    }

    /// Full turn: idle gate, dedup, dispatch, echo, reply.
    pub(crate) async fn send_and_wait(mut self) -> Result<TurnOutcome, TurnError> {
        self.idle_gate().await?;
        let dup = self.dup_check().await?;
        let mut timings = TurnTimings {
            precheck_ms: self.elapsed_ms(),
            ..TurnTimings::default()
        };

        let send_started = Instant::now();
        let (snapshot, confirmation, anchored) = match dup {
            DupCheck::Reused { text, snapshot } => {
                self.record(
                    ErrorCode::PrecheckReplyAlreadyAvailable,
                    "reply already on page, returning it",
                );
                return Ok(self.outcome(text, &snapshot, Confirmation::Existing, true, timings));
            }
            DupCheck::Wait(snapshot) => (snapshot, Confirmation::Existing, true),
            DupCheck::Send(baseline) => match self.dispatch(baseline).await? {
                Dispatched::Reused { text, snapshot } => {
                    timings.send_ms = send_started.elapsed().as_millis() as u64;
                    return Ok(self.outcome(text, &snapshot, Confirmation::Strict, true, timings));
                }
                Dispatched::Confirmed {
                    snapshot,
                    confirmation,
                    anchored,
                } => (snapshot, confirmation, anchored),
            },
        };
        timings.send_ms = send_started.elapsed().as_millis() as u64;

        let wait_started = Instant::now();
        let (text, last) = self.wait_for_reply(snapshot, anchored).await?;
        timings.wait_ms = wait_started.elapsed().as_millis() as u64;
        Ok(self.outcome(text, &last, confirmation, false, timings))
    }

    /// Idle gate through echo verification; returns once the prompt is known delivered.
    pub(crate) async fn send_and_confirm(mut self) -> Result<DispatchReceipt, TurnError> {
        self.idle_gate().await?;
        self.enter(Phase::DupCheck);
        let baseline = self.read().await?;

        let (snapshot, confirmation, reply_text) =
            if prompt_echo_matches(self.prompt, &baseline.last_user_text) {
                info!(target: "turn-flow", "prompt is already the last user turn, not dispatching");
                (baseline, Confirmation::Existing, None)
            } else {
                match self.dispatch(baseline).await? {
                    Dispatched::Reused { text, snapshot } => {
                        (snapshot, Confirmation::Strict, Some(text))
                    }
                    Dispatched::Confirmed {
                        snapshot,
                        confirmation,
                        ..
                    } => (snapshot, confirmation, None),
                }
            };

        Ok(DispatchReceipt {
            confirmation,
            anchor: ReplyAnchor::from_snapshot(&snapshot),
            user_turn_count: snapshot.user_turn_count,
            reply_text,
            elapsed_ms: self.elapsed_ms(),
            warnings: self.warnings,
        })
    }

    /// Read-mostly reuse check. A reply still generating is waited for; a wait timeout
    /// is returned as an error rather than a miss.
    pub(crate) async fn precheck(mut self) -> Result<PrecheckOutcome, TurnError> {
        self.enter(Phase::Route);
        self.guard().ensure_route(self.target, self.deadline).await?;
        self.enter(Phase::DupCheck);
        let snapshot = self.read().await?;

        let probe = self
            .reuse_probe(
                snapshot,
                self.config.reuse_stability(),
                self.config.reuse_stability_cap(),
            )
            .await?;
        let (text, last) = match probe {
            ReuseProbe::Reused { text, snapshot } => (text, snapshot),
            ReuseProbe::InProgress(snapshot) => {
                info!(target: "turn-flow", "prompt found with reply in progress, waiting");
                self.deadline = deadline_within(self.config.reuse_wait_cap(), self.deadline);
                self.wait_for_reply(snapshot, true).await?
            }
            ReuseProbe::NotAnswered(_) | ReuseProbe::NotEchoed(_) => {
                let generating = self.guard().is_generation_in_progress().await?;
                return Ok(PrecheckOutcome::miss(generating));
            }
        };

        self.record(
            ErrorCode::PrecheckReplyAlreadyAvailable,
            "reply already available for prompt",
        );
        Ok(PrecheckOutcome {
            reused: true,
            fingerprint: Some(reply_fingerprint(self.prompt, &last)),
            anchor: Some(ReplyAnchor::from_snapshot(&last)),
            text: Some(text),
            generation_in_progress: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snap() -> PageSnapshot {
        PageSnapshot {
            url: "https://chatgpt.com/c/0123456789abcdef".into(),
            user_turn_count: 1,
            assistant_turn_count: 1,
            last_user_text: "earlier".into(),
            last_user_signature: "u1|7".into(),
            last_assistant_text: "earlier answer".into(),
            last_assistant_signature: "a1|14".into(),
            assistant_after_last_user: true,
            generation_indicator_visible: false,
        }
    }

    #[test]
    fn dispatch_signal_kinds() {
        let base = snap();
        assert_eq!(dispatch_signal(&base, &base), None);

        let mut user = base.clone();
        user.user_turn_count = 2;
        assert_eq!(dispatch_signal(&base, &user), Some(DispatchSignal::UserTurn));

        let mut assistant = base.clone();
        assistant.last_assistant_signature = "a1|20".into();
        assert_eq!(dispatch_signal(&base, &assistant), Some(DispatchSignal::AssistantTurn));

        let mut indicator = base.clone();
        indicator.generation_indicator_visible = true;
        assert_eq!(dispatch_signal(&base, &indicator), Some(DispatchSignal::Indicator));

        let mut stale = base.clone();
        stale.generation_indicator_visible = true;
        assert_eq!(dispatch_signal(&stale, &stale), None);
    }

    #[test]
    fn echo_requires_new_turn_with_exact_text() {
        let base = snap();
        let mut echoed = base.clone();
        echoed.user_turn_count = 2;
        echoed.last_user_text = "ping".into();
        echoed.last_user_signature = "u2|4".into();
        assert!(echo_confirmed("ping", &base, &echoed));
        assert!(!echo_confirmed("pin", &base, &echoed));

        let mut same_turn = base.clone();
        same_turn.last_user_text = "ping".into();
        assert!(!echo_confirmed("ping", &base, &same_turn));
    }

    #[test]
    fn soft_signal_ignores_assistant_only_changes() {
        let base = snap();
        let mut assistant = base.clone();
        assistant.assistant_turn_count = 2;
        assert!(!soft_signal(&base, &assistant));

        let mut indicator = base.clone();
        indicator.generation_indicator_visible = true;
        assert!(soft_signal(&base, &indicator));
    }

    #[test]
    fn anchored_activity_accepts_reply_already_after_prompt() {
        let base = snap();
        assert!(!activity_observed(&base, &base, false));
        assert!(activity_observed(&base, &base, true));

        let mut before_anchor = base.clone();
        before_anchor.assistant_after_last_user = false;
        assert!(!activity_observed(&before_anchor, &before_anchor, true));
    }

    #[test]
    fn unanchored_reply_must_be_new() {
        let base = snap();
        let mut pending = base.clone();
        pending.user_turn_count = 2;
        pending.last_user_text = "pin".into();
        pending.last_user_signature = "u2|3".into();
        pending.assistant_after_last_user = false;
        assert!(!reply_positioned(&base, &pending, false));

        // Leftover reply still counted as "after" the user turn by the page.
        let mut leftover = base.clone();
        leftover.user_turn_count = 2;
        assert!(!reply_positioned(&base, &leftover, false));
        assert!(reply_positioned(&base, &leftover, true));

        let mut answered = pending.clone();
        answered.assistant_turn_count = 2;
        answered.last_assistant_text = "pong".into();
        answered.last_assistant_signature = "a2|4".into();
        answered.assistant_after_last_user = true;
        assert!(reply_positioned(&base, &answered, false));
    }

    #[test]
    fn stability_needs_two_repeats() {
        let mut tracker = StabilityTracker::default();
        let mut current = snap();
        assert_eq!(tracker.observe(ReplyMarker::of(&current)), 0);
        assert_eq!(tracker.observe(ReplyMarker::of(&current)), 1);
        assert!(!tracker.settled());

        current.last_assistant_signature = "a1|30".into();
        assert_eq!(tracker.observe(ReplyMarker::of(&current)), 0);
        tracker.observe(ReplyMarker::of(&current));
        tracker.observe(ReplyMarker::of(&current));
        assert!(tracker.settled());

        // A trailing cursor glyph does not count as a change.
        current.last_assistant_text.push_str(" \u{258B}");
        tracker.observe(ReplyMarker::of(&current));
        assert!(tracker.settled());
    }

    #[test]
    fn stuck_tracker_measures_unchanged_span() {
        let start = Instant::now();
        let mut tracker = StuckTracker::default();
        let mut current = snap();
        assert_eq!(tracker.observe(&current, start), Duration::ZERO);
        assert_eq!(
            tracker.observe(&current, start + Duration::from_secs(4)),
            Duration::from_secs(4)
        );
        current.last_assistant_text.push_str(" more");
        assert_eq!(
            tracker.observe(&current, start + Duration::from_secs(6)),
            Duration::ZERO
        );
        assert_eq!(
            tracker.observe(&current, start + Duration::from_secs(9)),
            Duration::from_secs(3)
        );
    }
}
