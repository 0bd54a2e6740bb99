use serde::Serialize;

use shipwright::target::TargetSummary;

use super::{CmdResult, GlobalArgs, Session};

#[derive(Serialize)]
pub struct ListOutput {
    pub targets: Vec<TargetSummary>,
}

pub fn run(_args: (), global: &GlobalArgs) -> CmdResult<ListOutput> {
    let session = Session::load(global)?;
    Ok((
        ListOutput {
            targets: session.graph.list(),
        },
        0,
    ))
}
