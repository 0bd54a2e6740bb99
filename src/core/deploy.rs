//! Cloud Foundry deployment workflow.
//!
//! Eight chained targets: login, create space, target, create the shared
//! service, push the app instances, wait for the service, bind, restart.
//! Pushes run one at a time; binds and restarts fan out.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::batch::{self, BatchReport};
use crate::config::{ServicePlanConfig, ServiceReadyConfig};
use crate::error::Result;
use crate::params::{Param, Parameters};
use crate::platform::{Platform, PushSpec};
use crate::target::TargetDef;

pub struct DeployTargets;

impl DeployTargets {
    pub const LOGIN: &'static str = "cf-login";
    pub const CREATE_SPACE: &'static str = "cf-create-space";
    pub const TARGET: &'static str = "cf-target";
    pub const CREATE_SERVICE: &'static str = "cf-create-service";
    pub const PUSH: &'static str = "cf-push";
    pub const WAIT_SERVICE: &'static str = "cf-wait-service";
    pub const BIND: &'static str = "cf-bind";
    pub const RESTART: &'static str = "cf-restart";
    pub const DEPLOY: &'static str = "deploy";
}

pub const PUSH_DEGREE: usize = 1;
pub const BIND_DEGREE: usize = 5;
pub const RESTART_DEGREE: usize = 5;
pub const DEFAULT_APP_PREFIX: &str = "app";

/// One pushed application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUnit {
    pub name: String,
    pub hostname: String,
    pub org: String,
    pub space: String,
    pub bound: bool,
    pub restarted: bool,
}

impl DeploymentUnit {
    pub fn push_spec(&self, path: &str, domain: Option<&str>) -> PushSpec {
        PushSpec {
            name: self.name.clone(),
            hostname: self.hostname.clone(),
            path: path.to_string(),
            domain: domain.map(String::from),
        }
    }
}

impl fmt::Display for DeploymentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// `{prefix}1` .. `{prefix}{count}`, each with a fresh random route.
pub fn units_for(prefix: &str, count: usize, org: &str, space: &str) -> Vec<DeploymentUnit> {
    (1..=count)
        .map(|i| {
            let name = format!("{}{}", prefix, i);
            DeploymentUnit {
                hostname: random_hostname(&name),
                name,
                org: org.to_string(),
                space: space.to_string(),
                bound: false,
                restarted: false,
            }
        })
        .collect()
}

pub fn random_hostname(name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", name, &suffix[..8]).to_ascii_lowercase()
}

/// Host part of an API endpoint, with scheme, port and path removed.
fn endpoint_host(api: &str) -> String {
    let without_scheme = api.split_once("://").map_or(api, |(_, rest)| rest);
    without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Pick the service plan: explicit override, else trial for configured
/// public hosts, else standard.
pub fn select_service_plan(api: &str, plans: &ServicePlanConfig, overridden: Option<&str>) -> String {
    if let Some(plan) = overridden {
        return plan.to_string();
    }
    let host = endpoint_host(api);
    let is_trial = plans.trial_hosts.iter().any(|h| {
        let h = h.to_ascii_lowercase();
        host == h || host.ends_with(&format!(".{}", h))
    });
    if is_trial {
        plans.trial_plan.clone()
    } else {
        plans.standard_plan.clone()
    }
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub service: ServicePlanConfig,
    pub ready: ServiceReadyConfig,
    pub artifact_path: String,
    /// Target that produces `artifact_path`; `cf-push` depends on it when set.
    pub artifact_target: Option<String>,
}

pub struct Deployment {
    platform: Arc<dyn Platform>,
    settings: DeploySettings,
    units: Mutex<Vec<DeploymentUnit>>,
}

impl Deployment {
    pub fn new(platform: Arc<dyn Platform>, settings: DeploySettings) -> Arc<Self> {
        Arc::new(Self {
            platform,
            settings,
            units: Mutex::new(Vec::new()),
        })
    }

    /// Snapshot of the instances touched by this run.
    pub fn units(&self) -> Vec<DeploymentUnit> {
        self.units
            .lock()
            .map(|u| u.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn targets(self: &Arc<Self>) -> Vec<TargetDef> {
        let org_space = [Param::CF_ORG, Param::CF_SPACE];

        let step = |name: &'static str, f: fn(&Deployment, &Parameters) -> Result<()>| {
            let this = Arc::clone(self);
            TargetDef::new(name).hidden().executes(move |p| f(&this, p))
        };

        let mut push = step(DeployTargets::PUSH, Deployment::push_units)
            .description("Push the application instances")
            .depends_on([DeployTargets::CREATE_SERVICE])
            .requires_all(org_space);
        if let Some(artifact) = &self.settings.artifact_target {
            push = push.depends_on([artifact.clone()]);
        }

        vec![
            step(DeployTargets::LOGIN, Deployment::login)
                .description("Authenticate against the platform API")
                .only_when("CfSkipLogin is not set", |p| !p.flag(Param::CF_SKIP_LOGIN))
                .requires_all([Param::CF_USERNAME, Param::CF_PASSWORD, Param::CF_API_ENDPOINT]),
            step(DeployTargets::CREATE_SPACE, Deployment::create_space)
                .description("Create the target space")
                .depends_on([DeployTargets::LOGIN])
                .requires_all(org_space),
            step(DeployTargets::TARGET, Deployment::target_space)
                .description("Select the org and space")
                .depends_on([DeployTargets::CREATE_SPACE])
                .requires_all(org_space),
            step(DeployTargets::CREATE_SERVICE, Deployment::create_service)
                .description("Provision the shared service instance")
                .depends_on([DeployTargets::TARGET])
                .requires_all(org_space),
            push,
            step(DeployTargets::WAIT_SERVICE, Deployment::wait_for_service)
                .description("Wait until the shared service is ready")
                .depends_on([DeployTargets::PUSH])
                .requires_all(org_space),
            step(DeployTargets::BIND, Deployment::bind_units)
                .description("Bind the shared service to every instance")
                .depends_on([DeployTargets::WAIT_SERVICE])
                .requires_all(org_space),
            step(DeployTargets::RESTART, Deployment::restart_units)
                .description("Restart every instance")
                .depends_on([DeployTargets::BIND])
                .requires_all(org_space),
            TargetDef::new(DeployTargets::DEPLOY)
                .description("Deploy the application instances to Cloud Foundry")
                .depends_on([DeployTargets::RESTART]),
        ]
    }

    fn login(&self, params: &Parameters) -> Result<()> {
        let api = params.require(DeployTargets::LOGIN, Param::CF_API_ENDPOINT)?;
        let user = params.require(DeployTargets::LOGIN, Param::CF_USERNAME)?;
        let password = params.require(DeployTargets::LOGIN, Param::CF_PASSWORD)?;
        self.platform.login(api, user, password)
    }

    fn create_space(&self, params: &Parameters) -> Result<()> {
        let (org, space) = org_space(DeployTargets::CREATE_SPACE, params)?;
        self.platform.create_space(org, space)
    }

    fn target_space(&self, params: &Parameters) -> Result<()> {
        let (org, space) = org_space(DeployTargets::TARGET, params)?;
        self.platform.target(org, space)
    }

    fn create_service(&self, params: &Parameters) -> Result<()> {
        let plans = &self.settings.service;
        let plan = select_service_plan(
            params.get_or(Param::CF_API_ENDPOINT, ""),
            plans,
            params.get(Param::SERVICE_PLAN),
        );
        log_status!("deploy", "Using plan '{}' for {}", plan, plans.instance_name);
        self.platform
            .create_service(&plans.offering, &plan, &plans.instance_name)
    }

    fn push_units(&self, params: &Parameters) -> Result<()> {
        let (org, space) = org_space(DeployTargets::PUSH, params)?;
        let prefix = params.get_or(Param::APP_NAME_PREFIX, DEFAULT_APP_PREFIX);
        let units = units_for(prefix, params.apps_count()?, org, space);
        self.replace_units(units.clone());

        let path = &self.settings.artifact_path;
        let domain = params.get(Param::CF_DOMAIN);
        self.log_report(batch::run_batch("cf push", &units, PUSH_DEGREE, |unit| {
            self.platform.push(&unit.push_spec(path, domain))
        })?);
        Ok(())
    }

    fn wait_for_service(&self, _params: &Parameters) -> Result<()> {
        self.platform.ensure_service_ready(
            &self.settings.service.instance_name,
            Duration::from_secs(self.settings.ready.timeout_secs),
            Duration::from_secs(self.settings.ready.interval_secs),
        )
    }

    fn bind_units(&self, params: &Parameters) -> Result<()> {
        let units = self.current_units(DeployTargets::BIND, params)?;
        let service = &self.settings.service.instance_name;
        self.log_report(batch::run_batch("cf bind-service", &units, BIND_DEGREE, |unit| {
            self.platform.bind_service(&unit.name, service)?;
            self.update_unit(&unit.name, |u| u.bound = true);
            Ok(())
        })?);
        Ok(())
    }

    fn restart_units(&self, params: &Parameters) -> Result<()> {
        let units = self.current_units(DeployTargets::RESTART, params)?;
        self.log_report(batch::run_batch("cf restart", &units, RESTART_DEGREE, |unit| {
            self.platform.restart(&unit.name)?;
            self.update_unit(&unit.name, |u| u.restarted = true);
            Ok(())
        })?);
        Ok(())
    }

    /// Units pushed earlier in this run, or the configured names when the
    /// push step was not part of it.
    fn current_units(&self, target: &str, params: &Parameters) -> Result<Vec<DeploymentUnit>> {
        let existing = self.units();
        if !existing.is_empty() {
            return Ok(existing);
        }
        let (org, space) = org_space(target, params)?;
        let prefix = params.get_or(Param::APP_NAME_PREFIX, DEFAULT_APP_PREFIX);
        let units = units_for(prefix, params.apps_count()?, org, space);
        self.replace_units(units.clone());
        Ok(units)
    }

    fn replace_units(&self, units: Vec<DeploymentUnit>) {
        let mut guard = self.units.lock().unwrap_or_else(|p| p.into_inner());
        *guard = units;
    }

    fn update_unit(&self, name: &str, apply: impl FnOnce(&mut DeploymentUnit)) {
        let mut guard = self.units.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(unit) = guard.iter_mut().find(|u| u.name == name) {
            apply(unit);
        }
    }

    fn log_report(&self, report: BatchReport) {
        log_status!("deploy", "{}: {} instance(s) done", report.label, report.items.len());
    }
}

fn org_space<'a>(target: &str, params: &'a Parameters) -> Result<(&'a str, &'a str)> {
    Ok((
        params.require(target, Param::CF_ORG)?,
        params.require(target, Param::CF_SPACE)?,
    ))
}
