//! Timing and retry tunables for a turn. All values are milliseconds unless named otherwise.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const ACTIVITY_FLOOR_MS: u64 = 15_000;
const MAX_DISPATCH_ATTEMPTS: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Poll interval for reply waiting and send readiness.
    pub poll_interval_ms: u64,
    /// Poll interval while looking for a dispatch signal.
    pub verify_poll_ms: u64,
    /// Poll interval while looking for the prompt echo.
    pub echo_poll_ms: u64,
    /// Budget for the assistant to show any activity. Never below 15 s.
    pub activity_timeout_ms: u64,
    /// Indicator visible with an unchanged marker for this long counts as stale.
    pub stale_indicator_quiet_ms: u64,
    pub stale_indicator_poll_ms: u64,
    pub pre_send_idle_timeout_ms: u64,
    /// Indicator visible with unchanged reply content for this long triggers a soft reset.
    pub reply_stuck_ms: u64,
    pub reuse_stability_ms: u64,
    pub probe_stability_ms: u64,
    pub stability_poll_ms: u64,
    pub reuse_stability_cap_ms: u64,
    pub dispatch_verify_ms: u64,
    pub echo_verify_ms: u64,
    pub echo_recheck_ms: u64,
    pub composer_timeout_ms: u64,
    pub send_ready_timeout_ms: u64,
    pub reroute_settle_ms: u64,
    pub recovery_timeout_ms: u64,
    pub reuse_wait_cap_ms: u64,
    /// Total dispatch attempts per invocation, first one included. At most one retry is
    /// ever made, so values above 2 act as 2.
    pub max_dispatch_attempts: u32,
    pub heartbeat_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            verify_poll_ms: 200,
            echo_poll_ms: 250,
            activity_timeout_ms: 45_000,
            stale_indicator_quiet_ms: 8_000,
            stale_indicator_poll_ms: 400,
            pre_send_idle_timeout_ms: 10_000,
            reply_stuck_ms: 10_000,
            reuse_stability_ms: 900,
            probe_stability_ms: 400,
            stability_poll_ms: 200,
            reuse_stability_cap_ms: 4_000,
            dispatch_verify_ms: 8_000,
            echo_verify_ms: 8_000,
            echo_recheck_ms: 3_000,
            composer_timeout_ms: 30_000,
            send_ready_timeout_ms: 300_000,
            reroute_settle_ms: 500,
            recovery_timeout_ms: 120_000,
            reuse_wait_cap_ms: 300_000,
            max_dispatch_attempts: 2,
            heartbeat_ms: 5_000,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl TurnConfig {
    pub fn poll_interval(&self) -> Duration {
        ms(self.poll_interval_ms.max(1))
    }

    pub fn verify_poll(&self) -> Duration {
        ms(self.verify_poll_ms.max(1))
    }

    pub fn echo_poll(&self) -> Duration {
        ms(self.echo_poll_ms.max(1))
    }

    pub fn activity_timeout(&self) -> Duration {
        ms(self.activity_timeout_ms.max(ACTIVITY_FLOOR_MS))
    }

    pub fn stale_indicator_quiet(&self) -> Duration {
        ms(self.stale_indicator_quiet_ms)
    }

    pub fn stale_indicator_poll(&self) -> Duration {
        ms(self.stale_indicator_poll_ms.max(1))
    }

    /// Stop-click wait before falling back to a soft reset; capped at 12 s.
    pub fn pre_send_idle_timeout(&self) -> Duration {
        ms(self.pre_send_idle_timeout_ms.min(12_000))
    }

    pub fn reply_stuck(&self) -> Duration {
        ms(self.reply_stuck_ms)
    }

    pub fn reuse_stability(&self) -> Duration {
        ms(self.reuse_stability_ms)
    }

    /// Quiet window for the reply-ready probe; capped at 2 s.
    pub fn probe_stability(&self) -> Duration {
        ms(self.probe_stability_ms.min(2_000))
    }

    pub fn stability_poll(&self) -> Duration {
        ms(self.stability_poll_ms.max(1))
    }

    pub fn reuse_stability_cap(&self) -> Duration {
        ms(self.reuse_stability_cap_ms)
    }

    pub fn dispatch_verify(&self) -> Duration {
        ms(self.dispatch_verify_ms)
    }

    pub fn echo_verify(&self) -> Duration {
        ms(self.echo_verify_ms)
    }

    pub fn echo_recheck(&self) -> Duration {
        ms(self.echo_recheck_ms)
    }

    pub fn composer_timeout(&self) -> Duration {
        ms(self.composer_timeout_ms)
    }

    pub fn send_ready_timeout(&self) -> Duration {
        ms(self.send_ready_timeout_ms)
    }

    pub fn reroute_settle(&self) -> Duration {
        ms(self.reroute_settle_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        ms(self.recovery_timeout_ms)
    }

    pub fn reuse_wait_cap(&self) -> Duration {
        ms(self.reuse_wait_cap_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        ms(self.heartbeat_ms.max(1))
    }

    pub fn max_dispatch_attempts(&self) -> u32 {
        self.max_dispatch_attempts.clamp(1, MAX_DISPATCH_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_timeout_has_floor() {
        let config = TurnConfig {
            activity_timeout_ms: 1_000,
            ..TurnConfig::default()
        };
        assert_eq!(config.activity_timeout(), Duration::from_secs(15));
        assert_eq!(TurnConfig::default().activity_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn capped_windows() {
        let config = TurnConfig {
            probe_stability_ms: 9_000,
            pre_send_idle_timeout_ms: 60_000,
            max_dispatch_attempts: 0,
            ..TurnConfig::default()
        };
        assert_eq!(config.probe_stability(), Duration::from_secs(2));
        assert_eq!(config.pre_send_idle_timeout(), Duration::from_secs(12));
        assert_eq!(config.max_dispatch_attempts(), 1);
    }

    #[test]
    fn dispatch_attempts_never_exceed_one_retry() {
        let config = TurnConfig {
            max_dispatch_attempts: 5,
            ..TurnConfig::default()
        };
        assert_eq!(config.max_dispatch_attempts(), 2);
        assert_eq!(TurnConfig::default().max_dispatch_attempts(), 2);
    }

    #[test]
    fn partial_yaml_like_input_keeps_defaults() {
        let config: TurnConfig =
            serde_json::from_value(serde_json::json!({ "reply_stuck_ms": 3000 })).unwrap();
        assert_eq!(config.reply_stuck_ms, 3_000);
        assert_eq!(config.poll_interval_ms, 500);
    }
}
