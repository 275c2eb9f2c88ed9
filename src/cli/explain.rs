use anyhow::{bail, Result};
use error_taxonomy::{resolve_error_spec_with_match, ErrorSpec, MatchKind};
use serde::Serialize;

use super::commands::ExplainArgs;
use super::context::CliContext;
use super::exit::Exit;
use super::output::emit;

#[derive(Serialize)]
struct Explained {
    #[serde(rename = "match")]
    matched: MatchKind,
    #[serde(flatten)]
    spec: ErrorSpec,
}

pub async fn cmd_explain(args: ExplainArgs, ctx: &CliContext) -> Result<Exit> {
    let Some((spec, matched)) = resolve_error_spec_with_match(&args.code) else {
        bail!("an error code is required");
    };
    emit(ctx.json(), &Explained { matched, spec }, |e| {
        let recommended: Vec<String> = e
            .spec
            .recommended
            .iter()
            .map(|action| format!("{action:?}"))
            .collect();
        format!(
            "{} ({:?}, {:?} match)\n{}\n{}\nrecommended: {}\nsafe to auto-retry: {}",
            e.spec.code,
            e.spec.class,
            e.matched,
            e.spec.title,
            e.spec.explanation,
            recommended.join(", "),
            e.spec.safe_to_auto_retry
        )
    })?;
    Ok(Exit::Ok)
}
