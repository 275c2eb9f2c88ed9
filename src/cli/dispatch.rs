use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::exit::Exit;
use super::explain::cmd_explain;
use super::probe::{
    cmd_fetch_last, cmd_probe_contract, cmd_probe_ready, cmd_reply_ready, cmd_soft_reset,
};
use super::turn::{cmd_precheck, cmd_send};
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<Exit> {
    match cli.command.clone() {
        Commands::Send(args) => cmd_send(args, ctx).await,
        Commands::Precheck(args) => cmd_precheck(args, ctx).await,
        Commands::ProbeReady => cmd_probe_ready(ctx).await,
        Commands::ReplyReady(args) => cmd_reply_ready(args, ctx).await,
        Commands::SoftReset(args) => cmd_soft_reset(args, ctx).await,
        Commands::FetchLast(args) => cmd_fetch_last(args, ctx).await,
        Commands::ProbeContract => cmd_probe_contract(ctx).await,
        Commands::Explain(args) => cmd_explain(args, ctx).await,
    }
}
