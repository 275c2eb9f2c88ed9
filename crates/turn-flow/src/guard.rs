//! Readiness & route guard: keeps the page on the target conversation and decides
//! when it is safe to send.

use std::fmt;
use std::time::Duration;

use chatturn_core_types::{PageProbe, TurnMarker};
use error_taxonomy::ErrorCode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::condition::{Phase, ProbeResultExt, TurnError};
use crate::config::TurnConfig;
use crate::poll::{deadline_within, poll_until, Heartbeat, Poller};

const COMPOSER_POLL: Duration = Duration::from_millis(250);

static CONVERSATION_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://chatgpt\.com/c/([0-9a-fA-F-]{16,})").expect("conversation url regex")
});

/// Identity of one conversation, taken from its URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn from_url(url: &str) -> Option<Self> {
        let without_fragment = url.split('#').next().unwrap_or_default();
        CONVERSATION_URL
            .captures(without_fragment)
            .and_then(|caps| caps.get(1))
            .map(|id| ConversationId(id.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a turn must happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnTarget {
    url: String,
    conversation: Option<ConversationId>,
}

impl TurnTarget {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let conversation = ConversationId::from_url(&url);
        Self { url, conversation }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    /// Targets without a conversation id accept any page.
    pub fn matches(&self, active_url: &str) -> bool {
        match &self.conversation {
            None => true,
            Some(expected) => ConversationId::from_url(active_url).as_ref() == Some(expected),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardState {
    Unknown,
    CheckingRoute,
    Routed,
    Rerouting,
    CheckingReady,
    Ready,
    Generating,
    Stuck,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    pub rerouted: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReadyReport {
    /// The indicator was still visible but stopped correlating with page changes.
    pub stale_indicator: bool,
    pub has_composer: bool,
    pub waited_ms: u64,
}

pub struct RouteGuard<'a, P: ?Sized> {
    probe: &'a P,
    config: &'a TurnConfig,
    state: GuardState,
}

impl<'a, P: PageProbe + ?Sized> RouteGuard<'a, P> {
    pub fn new(probe: &'a P, config: &'a TurnConfig) -> Self {
        Self {
            probe,
            config,
            state: GuardState::Unknown,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    fn enter(&mut self, next: GuardState) {
        if self.state != next {
            debug!(target: "route-guard", from = ?self.state, to = ?next, "guard transition");
            self.state = next;
        }
    }

    /// Puts the page on `target`, navigating at most once.
    pub async fn ensure_route(
        &mut self,
        target: &TurnTarget,
        deadline: Instant,
    ) -> Result<RouteReport, TurnError> {
        self.enter(GuardState::CheckingRoute);
        let snapshot = self.probe.read_state().await.during(Phase::Route)?;
        if target.matches(&snapshot.url) {
            self.enter(GuardState::Routed);
            return Ok(RouteReport { rerouted: false });
        }

        self.enter(GuardState::Rerouting);
        warn!(
            target: "route-guard",
            active = %snapshot.url,
            expected = target.url(),
            "page is on another conversation, navigating"
        );
        self.probe.navigate(target.url()).await.during(Phase::Route)?;
        sleep(self.config.reroute_settle()).await;

        let poller = Poller::new(
            deadline_within(self.config.composer_timeout(), deadline),
            self.config.poll_interval(),
        );
        let mut active_url = snapshot.url;
        loop {
            match self.probe.read_state().await {
                Ok(snapshot) if target.matches(&snapshot.url) => {
                    self.enter(GuardState::Routed);
                    info!(target: "route-guard", url = target.url(), "rerouted");
                    return Ok(RouteReport { rerouted: true });
                }
                Ok(snapshot) => active_url = snapshot.url,
                Err(err) => {
                    debug!(target: "route-guard", %err, "state read failed while rerouting");
                }
            }
            if !poller.tick().await {
                break;
            }
        }

        let err = TurnError::RouteMismatch {
            active_url,
            target_url: target.url().to_string(),
            rerouted: true,
        };
        warn!(target: "route-guard", code = %err.code(), %err, "reroute did not take");
        Err(err)
    }

    /// Waits for the composer. Probe failures count as "not yet" since the page may be loading.
    pub async fn wait_for_composer(&mut self, deadline: Instant) -> Result<(), TurnError> {
        let started = Instant::now();
        let probe = self.probe;
        let found = poll_until(Poller::new(deadline, COMPOSER_POLL), || async move {
            match probe.is_composer_present().await {
                Ok(present) => Ok::<_, TurnError>(present.then_some(())),
                Err(err) => {
                    debug!(target: "route-guard", %err, "composer probe failed");
                    Ok(None)
                }
            }
        })
        .await?;
        match found {
            Some(()) => Ok(()),
            None => Err(TurnError::ComposerMissing {
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Polls until the composer exists and no indicator is visible.
    ///
    /// A visible indicator whose turn marker stays unchanged for the stale window is
    /// reported as stale and treated as idle.
    pub async fn wait_until_send_ready(&mut self, deadline: Instant) -> Result<ReadyReport, TurnError> {
        self.enter(GuardState::CheckingReady);
        let started = Instant::now();
        let poller = Poller::new(deadline, self.config.poll_interval());
        let mut heartbeat = Heartbeat::new(self.config.heartbeat());
        let mut quiet: Option<(TurnMarker, Instant)> = None;

        loop {
            let readiness = self.probe.send_readiness().await.during(Phase::Readiness)?;
            let waited_ms = started.elapsed().as_millis() as u64;

            if readiness.indicator_visible {
                self.enter(GuardState::Generating);
                let marker = self.probe.read_state().await.during(Phase::Readiness)?.marker();
                let unchanged_since = match &quiet {
                    Some((last, since)) if *last == marker => Some(*since),
                    _ => None,
                };
                match unchanged_since {
                    Some(since) if since.elapsed() >= self.config.stale_indicator_quiet() => {
                        self.enter(GuardState::Stuck);
                        warn!(
                            target: "route-guard",
                            code = %ErrorCode::StaleIndicatorIdle,
                            quiet_ms = since.elapsed().as_millis() as u64,
                            "indicator visible without page changes, treating as idle"
                        );
                        return Ok(ReadyReport {
                            stale_indicator: true,
                            has_composer: readiness.has_composer,
                            waited_ms,
                        });
                    }
                    Some(_) => {}
                    None => quiet = Some((marker, Instant::now())),
                }
            } else {
                quiet = None;
                if readiness.has_composer {
                    self.enter(GuardState::Ready);
                    return Ok(ReadyReport {
                        stale_indicator: false,
                        has_composer: true,
                        waited_ms,
                    });
                }
            }

            if heartbeat.due() {
                info!(
                    target: "route-guard",
                    elapsed_ms = waited_ms,
                    composer = readiness.has_composer,
                    indicator = readiness.indicator_visible,
                    "waiting for send readiness"
                );
            }

            if !poller.tick().await {
                return Err(TurnError::SendNotReady {
                    waited_ms: started.elapsed().as_millis() as u64,
                    has_composer: readiness.has_composer,
                    indicator_visible: readiness.indicator_visible,
                });
            }
        }
    }

    /// True once the indicator is gone, false if it outlives the deadline.
    pub async fn wait_indicator_hidden(&mut self, deadline: Instant) -> Result<bool, TurnError> {
        let probe = self.probe;
        let hidden = poll_until(Poller::new(deadline, self.config.verify_poll()), || async move {
            let readiness = probe.send_readiness().await.during(Phase::IdleGate)?;
            Ok::<_, TurnError>((!readiness.indicator_visible).then_some(()))
        })
        .await?;
        Ok(hidden.is_some())
    }

    /// Whether the page is actually generating, not merely showing a stale indicator.
    pub async fn is_generation_in_progress(&mut self) -> Result<bool, TurnError> {
        let first = self.probe.read_state().await.during(Phase::Inspect)?;
        if !first.generation_indicator_visible {
            self.enter(GuardState::Ready);
            return Ok(false);
        }
        self.enter(GuardState::Generating);
        let baseline = first.marker();
        let poller = Poller::within(
            self.config.stale_indicator_quiet(),
            self.config.stale_indicator_poll(),
        );
        while poller.tick().await {
            let snapshot = self.probe.read_state().await.during(Phase::Inspect)?;
            if !snapshot.generation_indicator_visible {
                self.enter(GuardState::Ready);
                return Ok(false);
            }
            if snapshot.marker() != baseline {
                return Ok(true);
            }
        }
        self.enter(GuardState::Stuck);
        warn!(
            target: "route-guard",
            code = %ErrorCode::StaleIndicatorIdle,
            "indicator visible but page unchanged, not generating"
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn conversation_id_from_url() {
        let id = ConversationId::from_url("https://chatgpt.com/c/68a1f0e2-7c3b-8000-a1b2-0123456789ab#x")
            .unwrap();
        assert_eq!(id.as_str(), "68a1f0e2-7c3b-8000-a1b2-0123456789ab");
        assert!(ConversationId::from_url("https://chatgpt.com/").is_none());
        assert!(ConversationId::from_url("https://chatgpt.com/c/short").is_none());
        assert!(ConversationId::from_url("https://example.com/c/0123456789abcdef").is_none());
    }

    #[test]
    fn target_matching() {
        let target = TurnTarget::new("https://chatgpt.com/c/0123456789abcdef");
        assert!(target.matches("https://chatgpt.com/c/0123456789abcdef?model=x"));
        assert!(!target.matches("https://chatgpt.com/c/fedcba9876543210"));
        assert!(!target.matches("https://chatgpt.com/"));

        let fresh = TurnTarget::new("https://chatgpt.com/");
        assert!(fresh.conversation().is_none());
        assert!(fresh.matches("https://chatgpt.com/c/fedcba9876543210"));
    }
}
