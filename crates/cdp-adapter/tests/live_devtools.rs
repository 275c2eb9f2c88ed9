//! Live checks against a browser started with `--remote-debugging-port`.
//!
//! Ignored by default. Run with:
//! ```bash
//! export CHATTURN_LIVE_CDP=1
//! cargo test -p cdp-adapter --test live_devtools -- --ignored --nocapture
//! ```

use std::env;

use cdp_adapter::{list_targets, CdpConfig, PageSession};
use serde_json::json;

fn live_enabled() -> bool {
    env::var("CHATTURN_LIVE_CDP")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn live_config() -> CdpConfig {
    let mut cfg = CdpConfig::default();
    if let Ok(port) = env::var("CHATTURN_CDP_PORT") {
        cfg.port = port.parse().expect("CHATTURN_CDP_PORT must be a port number");
    }
    cfg
}

#[tokio::test]
#[ignore = "requires a browser with remote debugging; set CHATTURN_LIVE_CDP=1"]
async fn lists_targets_and_evaluates_in_first_page() {
    if !live_enabled() {
        eprintln!("skipping live devtools test (CHATTURN_LIVE_CDP not enabled)");
        return;
    }
    let cfg = live_config();
    let targets = list_targets(&cfg).await.expect("list targets");
    let page = targets
        .iter()
        .find(|t| t.is_page() && t.web_socket_debugger_url.is_some())
        .expect("at least one attachable page");

    let ws = page.web_socket_debugger_url.as_deref().expect("ws url");
    let session = PageSession::attach(ws, cfg).await.expect("attach");
    let value = session
        .evaluate("1 + 2", None)
        .await
        .expect("evaluate");
    assert_eq!(value, json!(3));
}

#[tokio::test]
#[ignore = "requires a browser with remote debugging; set CHATTURN_LIVE_CDP=1"]
async fn script_exceptions_surface_as_exception_kind() {
    if !live_enabled() {
        return;
    }
    let cfg = live_config();
    let targets = list_targets(&cfg).await.expect("list targets");
    let Some(ws) = targets
        .iter()
        .filter(|t| t.is_page())
        .find_map(|t| t.web_socket_debugger_url.clone())
    else {
        eprintln!("no attachable page");
        return;
    };
    let session = PageSession::attach(&ws, cfg).await.expect("attach");
    let err = session
        .evaluate("(() => { throw new Error('boom') })()", None)
        .await
        .expect_err("script throws");
    assert_eq!(err.kind, cdp_adapter::AdapterErrorKind::Exception);
}
