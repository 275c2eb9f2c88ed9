use anyhow::Result;
use serde_json::json;
use turn_flow::{NotReadyReason, ReplyReadiness, TranscriptTail, UiContractReport};

use super::commands::{FetchLastArgs, PromptArgs, SoftResetArgs};
use super::context::CliContext;
use super::exit::Exit;
use super::output::emit;
use super::turn::read_prompt;

pub async fn cmd_probe_ready(ctx: &CliContext) -> Result<Exit> {
    let target = ctx.target();
    let service = ctx.connect(&target).await?;
    let ready = service.probe_ready_for_send(&target).await?;
    emit(ctx.json(), &json!({ "ready": ready }), |_| {
        if ready { "ready" } else { "not ready" }.to_string()
    })?;
    Ok(if ready { Exit::Ok } else { Exit::Negative })
}

pub async fn cmd_reply_ready(args: PromptArgs, ctx: &CliContext) -> Result<Exit> {
    let prompt = read_prompt(&args).await?;
    let target = ctx.target();
    let service = ctx.connect(&target).await?;
    let readiness = service.reply_ready_probe(&target, &prompt).await?;

    emit(ctx.json(), &readiness, |r: &ReplyReadiness| match r.reason {
        None => "ready".to_string(),
        Some(reason) => format!("not ready: {reason:?}"),
    })?;
    Ok(match readiness.reason {
        None => Exit::Ok,
        Some(NotReadyReason::IndicatorVisible) => Exit::GenerationInProgress,
        Some(_) => Exit::Negative,
    })
}

pub async fn cmd_soft_reset(args: SoftResetArgs, ctx: &CliContext) -> Result<Exit> {
    let target = ctx.target();
    let service = ctx.connect(&target).await?;
    let report = service.try_soft_reset(&target, &args.reason).await?;
    emit(ctx.json(), &report, |r| {
        format!(
            "page reset in {}ms{}",
            r.elapsed_ms,
            if r.stale_indicator { " (indicator still visible)" } else { "" }
        )
    })?;
    Ok(Exit::Ok)
}

pub async fn cmd_fetch_last(args: FetchLastArgs, ctx: &CliContext) -> Result<Exit> {
    let target = ctx.target();
    let service = ctx.connect(&target).await?;
    let limit = args.limit.unwrap_or(ctx.config().session.fetch_limit);
    let tail = service.fetch_last(&target, limit).await?;

    emit(ctx.json(), &tail, |t: &TranscriptTail| {
        let mut lines: Vec<String> = t
            .messages
            .iter()
            .map(|m| format!("[{:?}] {}", m.role, m.preview))
            .collect();
        lines.push(format!("checkpoint {}", t.checkpoint_id));
        lines.join("\n")
    })?;
    Ok(Exit::Ok)
}

pub async fn cmd_probe_contract(ctx: &CliContext) -> Result<Exit> {
    let target = ctx.target();
    let service = ctx.connect(&target).await?;
    let report = service.probe_ui_contract(&target).await?;

    emit(ctx.json(), &report, |r: &UiContractReport| {
        if r.ok {
            "ui contract ok".to_string()
        } else {
            format!("ui contract failed, missing: {}", r.missing.join(", "))
        }
    })?;
    Ok(if report.ok { Exit::Ok } else { Exit::ContractFailed })
}
