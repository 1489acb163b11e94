use crate::args::{Cli, Commands};
use crate::context::ExecutionContext;
use crate::handlers;
use anyhow::Result;

pub fn run(cli: Cli) -> Result<()> {
    let ctx = ExecutionContext::new(&cli)?;

    match cli.command {
        Commands::Run { once, poll } => handlers::run::handle(&ctx, once, poll),
        Commands::Status => handlers::status::handle(&ctx),
        Commands::Failed { limit } => handlers::failed::handle(&ctx, limit),
        Commands::BuildTraces { tie_break } => {
            handlers::build_traces::handle(&ctx, tie_break.as_deref())
        }
        Commands::Traces {
            session,
            roots,
            limit,
        } => handlers::traces::handle(&ctx, session.as_deref(), roots, limit),
    }
}
