//! Runtime-platform operations used by the deployment targets.
//!
//! [`Platform`] is the seam the workflow talks to; [`CfCli`] drives the
//! `cf` command line. Readiness polling lives here so its timeout behaviour
//! is shared by every implementation.

use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, ErrorCode, Result};
use crate::utils::command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSpec {
    pub name: String,
    pub hostname: String,
    pub path: String,
    /// Route domain; the platform's default shared domain when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Ready,
    InProgress(String),
    Failed(String),
}

impl ServiceStatus {
    fn describe(&self) -> &str {
        match self {
            ServiceStatus::Ready => "ready",
            ServiceStatus::InProgress(s) | ServiceStatus::Failed(s) => s,
        }
    }
}

pub trait Platform: Send + Sync {
    fn login(&self, api: &str, username: &str, password: &str) -> Result<()>;
    fn create_space(&self, org: &str, space: &str) -> Result<()>;
    fn target(&self, org: &str, space: &str) -> Result<()>;
    fn create_service(&self, offering: &str, plan: &str, name: &str) -> Result<()>;
    fn push(&self, spec: &PushSpec) -> Result<()>;
    fn bind_service(&self, app: &str, service: &str) -> Result<()>;
    fn restart(&self, app: &str) -> Result<()>;
    fn service_status(&self, name: &str) -> Result<ServiceStatus>;

    fn ensure_service_ready(&self, name: &str, timeout: Duration, interval: Duration) -> Result<()> {
        wait_until_ready(name, || self.service_status(name), timeout, interval)
    }
}

/// Poll `probe` until it reports ready, fails, or `timeout` elapses.
pub fn wait_until_ready<P>(
    service: &str,
    mut probe: P,
    timeout: Duration,
    interval: Duration,
) -> Result<()>
where
    P: FnMut() -> Result<ServiceStatus>,
{
    let started = Instant::now();
    loop {
        let status = probe()?;
        match &status {
            ServiceStatus::Ready => {
                log_status!("cf", "Service '{}' is ready", service);
                return Ok(());
            }
            ServiceStatus::Failed(reason) => {
                return Err(Error::new(
                    ErrorCode::ExternalCommandFailed,
                    format!("Service '{}' provisioning failed: {}", service, reason),
                    serde_json::json!({ "service": service, "status": reason }),
                ));
            }
            ServiceStatus::InProgress(_) => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(Error::service_ready_timeout(
                service,
                elapsed.as_secs(),
                status.describe(),
            ));
        }
        log_status!("cf", "Waiting for '{}' ({})", service, status.describe());
        thread::sleep(interval.min(timeout - elapsed));
    }
}

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*status:\s*(.+?)\s*$").expect("Invalid regex pattern"));

/// Parse the `status:` line of `cf service <name>` output.
pub fn parse_service_status(output: &str) -> ServiceStatus {
    let Some(raw) = STATUS_LINE.captures(output).and_then(|c| c.get(1)) else {
        return ServiceStatus::InProgress("unknown".to_string());
    };
    let status = raw.as_str().to_ascii_lowercase();
    if status.ends_with("succeeded") {
        ServiceStatus::Ready
    } else if status.ends_with("failed") {
        ServiceStatus::Failed(status)
    } else {
        ServiceStatus::InProgress(status)
    }
}

/// First shared domain listed by `cf domains`.
pub fn parse_default_domain(output: &str) -> Option<String> {
    output
        .lines()
        .skip_while(|line| {
            let mut cols = line.split_whitespace();
            !(cols.next() == Some("name") && cols.next() == Some("availability"))
        })
        .skip(1)
        .find_map(|line| {
            let mut cols = line.split_whitespace();
            match (cols.next(), cols.next()) {
                (Some(name), Some("shared")) => Some(name.to_string()),
                _ => None,
            }
        })
}

/// `Platform` over the Cloud Foundry CLI (v7 and later).
pub struct CfCli {
    program: String,
}

impl Default for CfCli {
    fn default() -> Self {
        Self::new("cf")
    }
}

impl CfCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn cf(&self, args: &[&str]) -> Result<String> {
        let display = format!("{} {}", self.program, args.join(" "));
        log_status!("cf", "{}", display);
        command::run(&self.program, args, &display)
    }

    fn default_domain(&self) -> Result<String> {
        let output = self.cf(&["domains"])?;
        parse_default_domain(&output).ok_or_else(|| {
            Error::validation_invalid_argument(
                "domain",
                "No shared domain found in 'cf domains' output",
                None,
            )
            .with_hint("Set the CfDomain parameter to the domain routes should use")
        })
    }
}

impl Platform for CfCli {
    fn login(&self, api: &str, username: &str, password: &str) -> Result<()> {
        self.cf(&["api", api])?;
        let display = format!("{} auth (CF_USERNAME={})", self.program, username);
        log_status!("cf", "{}", display);
        command::run_with_env(
            &self.program,
            &["auth"],
            &[("CF_USERNAME", username), ("CF_PASSWORD", password)],
            &display,
        )?;
        Ok(())
    }

    fn create_space(&self, org: &str, space: &str) -> Result<()> {
        self.cf(&["create-space", space, "-o", org]).map(|_| ())
    }

    fn target(&self, org: &str, space: &str) -> Result<()> {
        self.cf(&["target", "-o", org, "-s", space]).map(|_| ())
    }

    fn create_service(&self, offering: &str, plan: &str, name: &str) -> Result<()> {
        self.cf(&["create-service", offering, plan, name]).map(|_| ())
    }

    fn push(&self, spec: &PushSpec) -> Result<()> {
        self.cf(&["push", &spec.name, "-p", &spec.path, "--no-route"])?;
        let domain = match &spec.domain {
            Some(domain) => domain.clone(),
            None => self.default_domain()?,
        };
        self.cf(&["map-route", &spec.name, &domain, "--hostname", &spec.hostname])
            .map(|_| ())
    }

    fn bind_service(&self, app: &str, service: &str) -> Result<()> {
        self.cf(&["bind-service", app, service]).map(|_| ())
    }

    fn restart(&self, app: &str) -> Result<()> {
        self.cf(&["restart", app]).map(|_| ())
    }

    fn service_status(&self, name: &str) -> Result<ServiceStatus> {
        let output = self.cf(&["service", name])?;
        Ok(parse_service_status(&output))
    }
}
