use cdp_adapter::CdpConfig;
use page_probe::Selectors;
use serde::{Deserialize, Serialize};
use turn_flow::TurnConfig;

/// Everything the binary reads from `chatturn.yaml`. Missing sections take defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cdp: CdpConfig,
    pub turn: TurnConfig,
    pub selectors: Selectors,
    pub session: SessionDefaults,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    /// Conversation used when `--url` is not given.
    pub url: String,
    pub timeout_secs: u64,
    pub fetch_limit: usize,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            url: "https://chatgpt.com/".to_string(),
            timeout_secs: 900,
            fetch_limit: 10,
        }
    }
}
