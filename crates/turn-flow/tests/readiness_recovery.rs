mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use support::{FakePage, Snap, CHAT_URL};
use tokio::time::Instant;
use turn_flow::{soft_reset, GuardState, RouteGuard, TurnConfig, TurnTarget};

#[tokio::test(start_paused = true)]
async fn indicator_without_page_changes_goes_stale() {
    let page = FakePage::new(Snap::answered("earlier", "answer").generating());
    let config = TurnConfig::default();
    let mut guard = RouteGuard::new(&page, &config);

    let started = Instant::now();
    let report = guard
        .wait_until_send_ready(started + Duration::from_secs(60))
        .await
        .unwrap();

    assert!(report.stale_indicator);
    assert!(started.elapsed() >= config.stale_indicator_quiet());
    assert_eq!(guard.state(), GuardState::Stuck);
}

#[tokio::test(start_paused = true)]
async fn indicator_with_streaming_reply_is_waited_out() {
    let mut frames: Vec<Snap> = (1..=20)
        .map(|n| Snap::answered("earlier", &"x".repeat(n)).generating())
        .collect();
    frames.push(Snap::answered("earlier", &"x".repeat(20)));
    let page = FakePage::new(Snap::answered("earlier", "answer").generating()).with_frames(frames);
    let config = TurnConfig::default();
    let mut guard = RouteGuard::new(&page, &config);

    let started = Instant::now();
    let report = guard
        .wait_until_send_ready(started + Duration::from_secs(60))
        .await
        .unwrap();

    assert!(!report.stale_indicator);
    assert!(started.elapsed() > config.stale_indicator_quiet());
    assert_eq!(guard.state(), GuardState::Ready);
}

#[tokio::test(start_paused = true)]
async fn soft_reset_load_wait_ends_at_caller_deadline() {
    let page = FakePage::new(Snap::empty()).never_loading();
    let config = TurnConfig::default();

    let started = Instant::now();
    let report = soft_reset(
        &page,
        &config,
        &TurnTarget::new(CHAT_URL),
        "page_not_loading",
        started + Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert!(started.elapsed() <= Duration::from_secs(1));
    assert!(!report.stale_indicator);
    assert_eq!(page.counters().reloads, 1);
}
