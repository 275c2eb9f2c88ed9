use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

/// One entry of the DevTools `/json/list` endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.kind.is_empty() || self.kind == "page"
    }
}

/// Lists the targets exposed by the browser's HTTP endpoint.
pub async fn list_targets(config: &CdpConfig) -> Result<Vec<TargetInfo>, AdapterError> {
    let url = format!("{}/json/list", config.http_base());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.list_timeout_ms))
        .build()
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))?;

    let response = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, "chatturn")
        .send()
        .await
        .map_err(|err| {
            let kind = if err.is_timeout() {
                AdapterErrorKind::Timeout
            } else {
                AdapterErrorKind::CdpIo
            };
            AdapterError::new(kind)
                .with_hint(format!("{url}: {err}"))
                .retriable(true)
        })?;

    if !response.status().is_success() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("{url} returned {}", response.status())));
    }

    let targets: Vec<TargetInfo> = response.json().await.map_err(|err| {
        AdapterError::new(AdapterErrorKind::Protocol).with_hint(format!("bad /json/list body: {err}"))
    })?;
    debug!(target: "cdp-transport", count = targets.len(), "listed devtools targets");
    Ok(targets)
}
