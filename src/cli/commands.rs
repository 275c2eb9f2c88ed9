use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Send a prompt and wait for the reply
    Send(SendArgs),

    /// Return the reply if the prompt was already answered; never sends
    Precheck(PromptArgs),

    /// Check that the page could accept a prompt right now
    ProbeReady,

    /// Check whether the reply to a prompt is complete and stable
    ReplyReady(PromptArgs),

    /// Reload the page and wait until it is usable again
    SoftReset(SoftResetArgs),

    /// Print the last turns of the conversation
    FetchLast(FetchLastArgs),

    /// Verify the page still exposes every element the turn flow relies on
    ProbeContract,

    /// Describe an error or warning code
    Explain(ExplainArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PromptArgs {
    /// Prompt text; read from --file or stdin when omitted
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long, value_name = "FILE", conflicts_with = "prompt")]
    pub file: Option<PathBuf>,

    /// Overall budget in seconds (defaults to the configured value)
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub prompt: PromptArgs,

    /// Return as soon as the prompt is confirmed delivered
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args, Clone, Debug)]
pub struct SoftResetArgs {
    /// Reason recorded in the logs
    #[arg(long, default_value = "manual")]
    pub reason: String,
}

#[derive(Args, Clone, Debug)]
pub struct FetchLastArgs {
    /// Number of turns (1 to 50)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct ExplainArgs {
    /// Code such as E_ROUTE_MISMATCH
    pub code: String,
}
