use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::{debug, error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::exit::{classify, Exit};
use super::runtime::{apply_overrides, init_logging, load_config, LoadedConfig};

pub async fn run() -> ExitCode {
    let cli = CliArgs::parse();

    if let Err(err) = init_logging(&cli.log_level, cli.debug, cli.log_json) {
        eprintln!("error: {err:#}");
        return ExitCode::from(Exit::Other.status());
    }
    info!("Starting chatturn v{}", env!("CARGO_PKG_VERSION"));

    let LoadedConfig { mut config, path } = match load_config(cli.config.as_ref()).await {
        Ok(loaded) => loaded,
        Err(err) => return report(&cli, err),
    };
    apply_overrides(&mut config, &cli);
    let ctx = CliContext::new(config, path, cli.json);
    debug!(config = %ctx.config_path().display(), url = %ctx.config().session.url, "context ready");

    let result = dispatch(&cli, &ctx).await;
    debug!(calls = ?cdp_adapter::metrics::snapshot(), "devtools call totals");
    match result {
        Ok(exit) => {
            info!(status = exit.status(), "Command completed");
            ExitCode::from(exit.status())
        }
        Err(err) => report(&cli, err),
    }
}

fn report(cli: &CliArgs, err: anyhow::Error) -> ExitCode {
    let (exit, code, evidence) = classify(&err);
    let code_str = code.map(|c| c.as_str()).unwrap_or("E_INTERNAL");
    error!(code = code_str, status = exit.status(), "Command failed: {err:#}");
    if cli.json {
        let body = json!({
            "ok": false,
            "code": code_str,
            "message": format!("{err:#}"),
            "evidence": evidence,
        });
        println!("{body:#}");
    } else {
        eprintln!("error [{code_str}]: {err:#}");
    }
    ExitCode::from(exit.status())
}
