use clap::Args;
use serde::Serialize;

use shipwright::build::BuildArtifacts;
use shipwright::config;
use shipwright::engine::{self, RunReport};
use shipwright::resolver;

use super::{CmdResult, GlobalArgs, Session};

#[derive(Args)]
pub struct RunArgs {
    /// Targets to run, in request order
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Parameter override (repeatable), e.g. `-p AppsCount=5`
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    #[serde(flatten)]
    pub report: RunReport,
    pub artifacts: BuildArtifacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let session = Session::load(global)?;
    let params = config::layered_parameters(&session.config, &args.params)?;
    let requested: Vec<&str> = args.targets.iter().map(String::as_str).collect();
    let plan = resolver::resolve(&session.graph, &requested)?;

    let report = engine::run(&session.graph, &plan, &params);

    let (error, exit_code) = match &report.error {
        Some(err) => (
            Some(RunError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
            }),
            crate::output::exit_code_for_error(err.code),
        ),
        None => (None, 0),
    };

    Ok((
        RunOutput {
            artifacts: session.build.artifacts(),
            report,
            error,
        },
        exit_code,
    ))
}
