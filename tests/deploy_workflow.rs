use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use shipwright::config::{ServicePlanConfig, ServiceReadyConfig};
use shipwright::deploy::{DeploySettings, Deployment};
use shipwright::engine::{self, RunReport, TargetStatus};
use shipwright::platform::{Platform, PushSpec, ServiceStatus};
use shipwright::{resolver, Error, ErrorCode, Param, Parameters, Result, TargetGraph};

/// Peak number of overlapping calls to one operation.
///
/// With `wait_for` set, each call holds until that many calls are in flight
/// (or a timeout passes), so reachable parallelism is actually observed.
#[derive(Default)]
struct InFlight {
    active: AtomicUsize,
    peak: AtomicUsize,
    arrived: Mutex<usize>,
    all_in: Condvar,
}

impl InFlight {
    fn enter(&self, wait_for: usize) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        self.all_in.notify_all();
        let _ = self
            .all_in
            .wait_timeout_while(arrived, Duration::from_secs(2), |n| *n < wait_for)
            .unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct FakePlatform {
    calls: Mutex<Vec<String>>,
    domains: Mutex<Vec<Option<String>>>,
    fail_push: Option<String>,
    status: Option<ServiceStatus>,
    wait_for: usize,
    binds: InFlight,
    restarts: InFlight,
}

impl FakePlatform {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_starting(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl Platform for FakePlatform {
    fn login(&self, api: &str, username: &str, _password: &str) -> Result<()> {
        self.record(format!("login {} {}", api, username));
        Ok(())
    }

    fn create_space(&self, org: &str, space: &str) -> Result<()> {
        self.record(format!("create-space {}/{}", org, space));
        Ok(())
    }

    fn target(&self, org: &str, space: &str) -> Result<()> {
        self.record(format!("target {}/{}", org, space));
        Ok(())
    }

    fn create_service(&self, offering: &str, plan: &str, name: &str) -> Result<()> {
        self.record(format!("create-service {} {} {}", offering, plan, name));
        Ok(())
    }

    fn push(&self, spec: &PushSpec) -> Result<()> {
        self.record(format!("push {}", spec.name));
        self.domains.lock().unwrap().push(spec.domain.clone());
        if self.fail_push.as_deref() == Some(spec.name.as_str()) {
            return Err(Error::internal_unexpected("route already taken"));
        }
        Ok(())
    }

    fn bind_service(&self, app: &str, service: &str) -> Result<()> {
        self.binds.enter(self.wait_for);
        self.record(format!("bind {} {}", app, service));
        self.binds.leave();
        Ok(())
    }

    fn restart(&self, app: &str) -> Result<()> {
        self.restarts.enter(self.wait_for);
        self.record(format!("restart {}", app));
        self.restarts.leave();
        Ok(())
    }

    fn service_status(&self, name: &str) -> Result<ServiceStatus> {
        self.record(format!("status {}", name));
        Ok(self.status.clone().unwrap_or(ServiceStatus::Ready))
    }
}

fn settings(timeout_secs: u64) -> DeploySettings {
    DeploySettings {
        service: ServicePlanConfig::default(),
        ready: ServiceReadyConfig {
            timeout_secs,
            interval_secs: 0,
        },
        artifact_path: "artifacts/publish".to_string(),
        artifact_target: None,
    }
}

fn deploy(platform: Arc<FakePlatform>, settings: DeploySettings, params: &Parameters) -> (RunReport, Arc<Deployment>) {
    let deployment = Deployment::new(platform, settings);
    let graph = TargetGraph::build(deployment.targets()).unwrap();
    let plan = resolver::resolve(&graph, &["deploy"]).unwrap();
    (engine::run(&graph, &plan, params), deployment)
}

fn base_params() -> Parameters {
    Parameters::defaults()
        .with(Param::CF_SKIP_LOGIN, "true")
        .with(Param::CF_API_ENDPOINT, "https://api.sys.example.com")
        .with(Param::CF_ORG, "acme")
        .with(Param::CF_SPACE, "dev")
}

#[test]
fn three_instances_are_pushed_bound_and_restarted() {
    let platform = Arc::new(FakePlatform::default());
    let (report, deployment) = deploy(Arc::clone(&platform), settings(5), &base_params());

    assert!(report.is_success(), "{:?}", report.error);
    assert!(matches!(report.outcome("cf-login"), Some(TargetStatus::Skipped { .. })));

    let units = deployment.units();
    let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["app1", "app2", "app3"]);
    assert!(units.iter().all(|u| u.bound && u.restarted));
    assert!(units.iter().all(|u| u.hostname.starts_with(&format!("{}-", u.name))));

    let calls = platform.calls();
    assert_eq!(
        &calls[..6],
        &[
            "create-space acme/dev",
            "target acme/dev",
            "create-service p-service-registry standard eureka",
            "push app1",
            "push app2",
            "push app3",
        ]
    );
    assert_eq!(calls[6], "status eureka");

    let mut binds = platform.calls_starting("bind");
    binds.sort();
    assert_eq!(binds, vec!["bind app1 eureka", "bind app2 eureka", "bind app3 eureka"]);
    assert_eq!(platform.calls_starting("restart").len(), 3);

    let last_bind = calls.iter().rposition(|c| c.starts_with("bind")).unwrap();
    let first_restart = calls.iter().position(|c| c.starts_with("restart")).unwrap();
    assert!(last_bind < first_restart);
}

#[test]
fn apps_count_and_prefix_control_instance_names() {
    let platform = Arc::new(FakePlatform::default());
    let params = base_params()
        .with(Param::APPS_COUNT, "2")
        .with(Param::APP_NAME_PREFIX, "web-");
    let (report, deployment) = deploy(Arc::clone(&platform), settings(5), &params);

    assert!(report.is_success());
    let names: Vec<String> = deployment.units().into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["web-1", "web-2"]);
}

#[test]
fn login_runs_with_credentials_when_not_skipped() {
    let platform = Arc::new(FakePlatform::default());
    let params = Parameters::defaults()
        .with(Param::CF_API_ENDPOINT, "https://api.run.pivotal.io")
        .with(Param::CF_USERNAME, "deployer")
        .with(Param::CF_PASSWORD, "hunter2")
        .with(Param::CF_ORG, "acme")
        .with(Param::CF_SPACE, "dev");
    let (report, _) = deploy(Arc::clone(&platform), settings(5), &params);

    assert!(report.is_success());
    let calls = platform.calls();
    assert_eq!(calls[0], "login https://api.run.pivotal.io deployer");
    assert!(calls.contains(&"create-service p-service-registry trial eureka".to_string()));
}

#[test]
fn missing_credentials_fail_login() {
    let platform = Arc::new(FakePlatform::default());
    let params = Parameters::defaults()
        .with(Param::CF_ORG, "acme")
        .with(Param::CF_SPACE, "dev");
    let (report, _) = deploy(Arc::clone(&platform), settings(5), &params);

    let err = report.error.as_ref().unwrap();
    assert_eq!(err.code, ErrorCode::TargetMissingParameter);
    assert_eq!(
        err.details["parameters"],
        serde_json::json!(["CfUsername", "CfPassword", "CfApiEndpoint"])
    );
    assert!(platform.calls().is_empty());
}

#[test]
fn missing_org_aborts_before_any_platform_call() {
    let platform = Arc::new(FakePlatform::default());
    let params = Parameters::defaults()
        .with(Param::CF_SKIP_LOGIN, "1")
        .with(Param::CF_SPACE, "dev");
    let (report, deployment) = deploy(Arc::clone(&platform), settings(5), &params);

    assert!(!report.is_success());
    assert_eq!(report.error.as_ref().unwrap().code, ErrorCode::TargetMissingParameter);
    assert!(matches!(
        report.outcome("cf-create-space"),
        Some(TargetStatus::Failed { .. })
    ));
    for name in ["cf-target", "cf-push", "cf-restart", "deploy"] {
        assert_eq!(report.outcome(name), Some(&TargetStatus::NotRun), "{}", name);
    }
    assert!(platform.calls().is_empty());
    assert!(deployment.units().is_empty());
}

#[test]
fn failed_push_stops_remaining_pushes() {
    let platform = Arc::new(FakePlatform {
        fail_push: Some("app2".to_string()),
        ..FakePlatform::default()
    });
    let (report, _) = deploy(Arc::clone(&platform), settings(5), &base_params());

    let err = report.error.as_ref().unwrap();
    assert_eq!(err.code, ErrorCode::ExternalBatchFailed);
    assert!(err.message.starts_with("Target 'cf-push' failed"));
    assert_eq!(platform.calls_starting("push"), vec!["push app1", "push app2"]);
    assert!(platform.calls_starting("bind").is_empty());
    assert_eq!(report.outcome("cf-wait-service"), Some(&TargetStatus::NotRun));
}

#[test]
fn service_that_never_becomes_ready_times_out() {
    let platform = Arc::new(FakePlatform {
        status: Some(ServiceStatus::InProgress("create in progress".to_string())),
        ..FakePlatform::default()
    });
    let (report, deployment) = deploy(Arc::clone(&platform), settings(0), &base_params());

    let err = report.error.as_ref().unwrap();
    assert_eq!(err.code, ErrorCode::ExternalServiceReadyTimeout);
    assert_eq!(err.details["target"], "cf-wait-service");
    assert!(platform.calls_starting("bind").is_empty());
    assert!(deployment.units().iter().all(|u| !u.bound));
}

#[test]
fn explicit_service_plan_wins() {
    let platform = Arc::new(FakePlatform::default());
    let params = base_params().with(Param::SERVICE_PLAN, "gold");
    let (report, _) = deploy(Arc::clone(&platform), settings(5), &params);

    assert!(report.is_success());
    assert!(platform
        .calls()
        .contains(&"create-service p-service-registry gold eureka".to_string()));
}

#[test]
fn binds_and_restarts_run_five_at_a_time() {
    let platform = Arc::new(FakePlatform {
        wait_for: 5,
        ..FakePlatform::default()
    });
    let params = base_params().with(Param::APPS_COUNT, "7");
    let (report, deployment) = deploy(Arc::clone(&platform), settings(5), &params);

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(platform.binds.peak(), 5);
    assert_eq!(platform.restarts.peak(), 5);
    assert_eq!(platform.calls_starting("bind").len(), 7);
    assert!(deployment.units().iter().all(|u| u.bound && u.restarted));
}

#[test]
fn pushes_run_in_order_with_the_route_domain() {
    let platform = Arc::new(FakePlatform::default());
    let params = base_params().with(Param::CF_DOMAIN, "apps.example.com");
    let (report, _) = deploy(Arc::clone(&platform), settings(5), &params);

    assert!(report.is_success());
    assert_eq!(
        platform.calls_starting("push"),
        vec!["push app1", "push app2", "push app3"]
    );
    assert!(platform
        .domains
        .lock()
        .unwrap()
        .iter()
        .all(|d| d.as_deref() == Some("apps.example.com")));
}
