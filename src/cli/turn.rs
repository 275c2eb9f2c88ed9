use anyhow::{bail, Context, Result};
use tokio::io::AsyncReadExt;
use turn_flow::{DispatchReceipt, PrecheckOutcome, TurnOutcome};

use super::commands::{PromptArgs, SendArgs};
use super::context::CliContext;
use super::exit::Exit;
use super::output::emit;

pub(crate) async fn read_prompt(args: &PromptArgs) -> Result<String> {
    let prompt = match (&args.prompt, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read prompt from stdin")?;
            buf
        }
    };
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }
    Ok(prompt)
}

pub async fn cmd_send(args: SendArgs, ctx: &CliContext) -> Result<Exit> {
    let prompt = read_prompt(&args.prompt).await?;
    let target = ctx.target();
    let timeout = ctx.timeout(args.prompt.timeout_secs);
    let service = ctx.connect(&target).await?;

    if args.no_wait {
        let receipt = service.send_and_confirm(&target, &prompt, timeout).await?;
        emit(ctx.json(), &receipt, |r: &DispatchReceipt| match &r.reply_text {
            Some(text) => text.clone(),
            None => format!("sent ({:?}, anchor {})", r.confirmation, r.anchor),
        })?;
        return Ok(Exit::Ok);
    }

    let outcome = service.send_and_wait(&target, &prompt, timeout).await?;
    emit(ctx.json(), &outcome, |o: &TurnOutcome| o.text.clone())?;
    Ok(Exit::Ok)
}

pub async fn cmd_precheck(args: PromptArgs, ctx: &CliContext) -> Result<Exit> {
    let prompt = read_prompt(&args).await?;
    let target = ctx.target();
    let service = ctx.connect(&target).await?;
    let outcome = service
        .precheck_reuse(&target, &prompt, ctx.timeout(args.timeout_secs))
        .await?;

    emit(ctx.json(), &outcome, |o: &PrecheckOutcome| match &o.text {
        Some(text) => text.clone(),
        None if o.generation_in_progress => "not answered yet (generation in progress)".into(),
        None => "not answered".into(),
    })?;
    Ok(if outcome.reused {
        Exit::Ok
    } else if outcome.generation_in_progress {
        Exit::GenerationInProgress
    } else {
        Exit::Negative
    })
}
