use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::config::AppConfig;
use super::env::CliArgs;

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
}

/// `--config`, else `./config/chatturn.yaml`, else `<config dir>/chatturn/config.yaml`.
pub fn config_search_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.clone());
    }
    let local = PathBuf::from("config/chatturn.yaml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|mut path| {
        path.push("chatturn");
        path.push("config.yaml");
        path
    })
}

pub async fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedConfig> {
    let Some(path) = config_search_path(explicit) else {
        warn!("No config directory available, using defaults");
        return Ok(LoadedConfig {
            config: AppConfig::default(),
            path: PathBuf::new(),
        });
    };

    if !path.exists() {
        if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        info!("Config file not found, using defaults: {}", path.display());
        return Ok(LoadedConfig {
            config: AppConfig::default(),
            path,
        });
    }

    let config = read_config(&path).await?;
    info!("Loaded configuration from: {}", path.display());
    Ok(LoadedConfig { config, path })
}

async fn read_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Command-line flags win over the file.
pub fn apply_overrides(config: &mut AppConfig, cli: &CliArgs) {
    if let Some(host) = &cli.cdp_host {
        config.cdp.host = host.clone();
    }
    if let Some(port) = cli.cdp_port {
        config.cdp.port = port;
    }
    if let Some(url) = &cli.url {
        config.session.url = url.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn explicit_config_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cdp:\n  host: devtools.local\n  port: 9555").unwrap();
        let path = file.path().to_path_buf();

        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.config.cdp.host, "devtools.local");
        assert_eq!(loaded.config.cdp.port, 9555);
        assert_eq!(loaded.path, path);
    }

    #[tokio::test]
    async fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(load_config(Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cdp: [not, a, map]").unwrap();
        let path = file.path().to_path_buf();
        let err = load_config(Some(&path)).await.err().unwrap();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
