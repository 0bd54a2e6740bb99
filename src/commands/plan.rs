use clap::Args;

use shipwright::resolver::{self, PlanOutput};

use super::{CmdResult, GlobalArgs, Session};

#[derive(Args)]
pub struct PlanArgs {
    /// Targets to resolve, in request order
    #[arg(required = true)]
    pub targets: Vec<String>,
}

pub fn run(args: PlanArgs, global: &GlobalArgs) -> CmdResult<PlanOutput> {
    let session = Session::load(global)?;
    let requested: Vec<&str> = args.targets.iter().map(String::as_str).collect();
    let plan = resolver::resolve(&session.graph, &requested)?;
    Ok((plan.to_output(&session.graph), 0))
}
