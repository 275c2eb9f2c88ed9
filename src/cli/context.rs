use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdp_adapter::{list_targets, PageSession};
use page_probe::CdpPageProbe;
use tracing::{debug, info};
use turn_flow::{TurnService, TurnTarget};

use super::config::AppConfig;
use super::exit::CliError;
use super::targets::find_target_tab;

pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: PathBuf,
    json: bool,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: PathBuf, json: bool) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            json,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn json(&self) -> bool {
        self.json
    }

    pub fn target(&self) -> TurnTarget {
        TurnTarget::new(self.config.session.url.clone())
    }

    pub fn timeout(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(override_secs.unwrap_or(self.config.session.timeout_secs))
    }

    /// Finds the tab for `target`, attaches to it and wraps it in a turn service.
    pub async fn connect(&self, target: &TurnTarget) -> Result<TurnService<CdpPageProbe>> {
        let cdp = &self.config.cdp;
        let targets = list_targets(cdp)
            .await
            .map_err(|source| CliError::DevtoolsUnreachable {
                endpoint: cdp.http_base(),
                source,
            })?;
        let tab = find_target_tab(&targets, target).ok_or_else(|| CliError::TargetUnresolved {
            url: target.url().to_string(),
            tabs: targets.iter().filter(|t| t.is_page()).count(),
        })?;
        let ws_url = tab
            .web_socket_debugger_url
            .as_deref()
            .context("selected tab has no websocket url")?;
        debug!(id = %tab.id, url = %tab.url, "selected tab");

        let session = PageSession::attach(ws_url, cdp.clone())
            .await
            .map_err(|source| CliError::DevtoolsUnreachable {
                endpoint: ws_url.to_string(),
                source,
            })?;
        let probe = CdpPageProbe::new(session, self.config.selectors.clone());
        probe.prepare().await;
        info!(tab = %tab.id, url = %tab.url, "attached to page");

        Ok(TurnService::new(Arc::new(probe), self.config.turn.clone()))
    }
}
