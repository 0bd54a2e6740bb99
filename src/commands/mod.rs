use shipwright::build::{BuildFile, Services};
use shipwright::config::{self, ShipwrightConfig};
use shipwright::TargetGraph;

pub type CmdResult<T> = shipwright::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub config: Option<String>,
}

/// Configuration, build file and resolved graph for one invocation.
pub(crate) struct Session {
    pub config: ShipwrightConfig,
    pub build: BuildFile,
    pub graph: TargetGraph,
}

impl Session {
    pub fn load(global: &GlobalArgs) -> shipwright::Result<Self> {
        let config = config::load(global.config.as_deref())?;
        let build = BuildFile::new(&config, Services::system(&config.paths));
        let graph = build.graph()?;
        Ok(Self {
            config,
            build,
            graph,
        })
    }
}

pub mod list;
pub mod plan;
pub mod run;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (shipwright::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Plan(args) => dispatch!(args, global, plan),
        crate::Commands::List => dispatch!((), global, list),
    }
}
