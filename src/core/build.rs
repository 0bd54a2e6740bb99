//! The stock build file: clean, publish, pack, checksum, release and the
//! Cloud Foundry deployment, wired to their collaborators.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::artifact::{self, CommandPublisher, PublishRequest, Publisher};
use crate::config::{PathsConfig, ShipwrightConfig};
use crate::deploy::{DeploySettings, Deployment, DeploymentUnit};
use crate::error::Result;
use crate::git::{GitRepository, SourceControl};
use crate::github::GitHubClient;
use crate::params::{Param, Parameters};
use crate::platform::{CfCli, Platform};
use crate::release::{self, ReleaseHost, ReleaseOutcome, ReleaseRequest};
use crate::target::{TargetDef, TargetGraph};
use crate::version::{GitVersionSource, VersionSource};

pub struct BuildTargets;

impl BuildTargets {
    pub const CLEAN: &'static str = "clean";
    pub const PUBLISH: &'static str = "publish";
    pub const PACK: &'static str = "pack";
    pub const CHECKSUM: &'static str = "checksum";
    pub const RELEASE: &'static str = "release";
}

pub const DEFAULT_PACKAGE_NAME: &str = "app";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// External collaborators. `publisher` and `release_host` are built from
/// parameters at run time when left unset.
pub struct Services {
    pub platform: Arc<dyn Platform>,
    pub source_control: Arc<dyn SourceControl>,
    pub versions: Arc<dyn VersionSource>,
    pub publisher: Option<Arc<dyn Publisher>>,
    pub release_host: Option<Arc<dyn ReleaseHost>>,
}

impl Services {
    /// `cf`, `git` and GitHub, rooted at the configured project directory.
    pub fn system(paths: &PathsConfig) -> Self {
        Self {
            platform: Arc::new(CfCli::default()),
            source_control: Arc::new(GitRepository::new(&paths.project)),
            versions: Arc::new(GitVersionSource::new(&paths.project)),
            publisher: None,
            release_host: None,
        }
    }
}

/// Side results a run leaves behind for reporting.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deployed: Vec<DeploymentUnit>,
}

struct Context {
    paths: PathsConfig,
    services: Services,
    archive: Mutex<Option<PathBuf>>,
    checksum: Mutex<Option<PathBuf>>,
    release: Mutex<Option<ReleaseOutcome>>,
}

pub struct BuildFile {
    ctx: Arc<Context>,
    deployment: Arc<Deployment>,
}

impl BuildFile {
    pub fn new(config: &ShipwrightConfig, services: Services) -> Self {
        let deployment = Deployment::new(
            Arc::clone(&services.platform),
            DeploySettings {
                service: config.service_plans.clone(),
                ready: config.service_ready.clone(),
                artifact_path: config.paths.publish_dir().to_string_lossy().to_string(),
                artifact_target: Some(BuildTargets::PUBLISH.to_string()),
            },
        );
        Self {
            ctx: Arc::new(Context {
                paths: config.paths.clone(),
                services,
                archive: Mutex::new(None),
                checksum: Mutex::new(None),
                release: Mutex::new(None),
            }),
            deployment,
        }
    }

    pub fn graph(&self) -> Result<TargetGraph> {
        TargetGraph::build(self.targets())
    }

    pub fn targets(&self) -> Vec<TargetDef> {
        let ctx = &self.ctx;
        let action = |f: fn(&Context, &Parameters) -> Result<()>| {
            let ctx = Arc::clone(ctx);
            move |p: &Parameters| f(&ctx, p)
        };
        let on_github = Arc::clone(&ctx.services.source_control);
        let pushed = Arc::clone(&ctx.services.source_control);

        let mut targets = vec![
            TargetDef::new(BuildTargets::CLEAN)
                .description("Delete the artifacts directory")
                .hidden()
                .executes(action(Context::clean)),
            TargetDef::new(BuildTargets::PUBLISH)
                .description("Publish the project into the artifacts directory")
                .after([BuildTargets::CLEAN])
                .executes(action(Context::publish)),
            TargetDef::new(BuildTargets::PACK)
                .description("Zip the published output")
                .depends_on([BuildTargets::PUBLISH])
                .triggers([BuildTargets::CHECKSUM])
                .executes(action(Context::pack)),
            TargetDef::new(BuildTargets::CHECKSUM)
                .description("Write a SHA-256 file next to the archive")
                .hidden()
                .executes(action(Context::checksum)),
            TargetDef::new(BuildTargets::RELEASE)
                .description("Upload the archive to a GitHub release")
                .depends_on([BuildTargets::PACK])
                .only_when("repository is hosted on GitHub", move |_| {
                    on_github.is_repo_github()
                })
                .only_when("HEAD is pushed to the remote", move |_| {
                    pushed.is_pushed_to_remote()
                })
                .requires(Param::GITHUB_TOKEN)
                .executes(action(Context::release)),
        ];
        targets.extend(self.deployment.targets());
        targets
    }

    pub fn artifacts(&self) -> BuildArtifacts {
        let path = |slot: &Mutex<Option<PathBuf>>| {
            lock(slot)
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
        };
        BuildArtifacts {
            archive: path(&self.ctx.archive),
            checksum: path(&self.ctx.checksum),
            release: lock(&self.ctx.release).clone(),
            deployed: self.deployment.units(),
        }
    }
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|p| p.into_inner())
}

impl Context {
    fn archive_path(&self, params: &Parameters) -> PathBuf {
        let name = params.get_or(Param::PACKAGE_NAME, DEFAULT_PACKAGE_NAME);
        self.paths.artifacts().join(format!("{}.zip", name))
    }

    fn clean(&self, _params: &Parameters) -> Result<()> {
        artifact::clean_dir(&self.paths.artifacts())
    }

    fn publish(&self, params: &Parameters) -> Result<()> {
        let version = self.services.versions.version(params)?;
        log_status!("publish", "Version {} ({})", version.semver, version.informational);

        let request = PublishRequest {
            project: self.paths.project.clone(),
            configuration: params.configuration()?,
            output: self.paths.publish_dir(),
            version,
        };
        match &self.services.publisher {
            Some(publisher) => publisher.publish(&request),
            None => {
                let template = params.require(BuildTargets::PUBLISH, Param::PUBLISH_COMMAND)?;
                CommandPublisher::new(template, ".").publish(&request)
            }
        }
    }

    fn pack(&self, params: &Parameters) -> Result<()> {
        let archive = self.archive_path(params);
        let files = artifact::create_zip_from_directory(&self.paths.publish_dir(), &archive)?;
        log_status!("pack", "{} file(s) -> {}", files, archive.display());
        *lock(&self.archive) = Some(archive);
        Ok(())
    }

    fn checksum(&self, params: &Parameters) -> Result<()> {
        let archive = lock(&self.archive)
            .clone()
            .unwrap_or_else(|| self.archive_path(params));
        let sum = artifact::write_checksum(&archive)?;
        *lock(&self.checksum) = Some(sum);
        Ok(())
    }

    fn release(&self, params: &Parameters) -> Result<()> {
        let version = self.services.versions.version(params)?;
        let repo = self.services.source_control.repository_identifier()?;
        let package = params.get_or(Param::PACKAGE_NAME, DEFAULT_PACKAGE_NAME);
        let request = ReleaseRequest {
            tag: version.tag(),
            asset_name: format!("{}.zip", package),
            content_type: ZIP_CONTENT_TYPE.to_string(),
            asset_path: self.archive_path(params),
        };

        let outcome = match &self.services.release_host {
            Some(host) => release::publish_release(host.as_ref(), &repo, &request)?,
            None => {
                let token = params.require(BuildTargets::RELEASE, Param::GITHUB_TOKEN)?;
                let client = GitHubClient::new(token)?;
                release::publish_release(&client, &repo, &request)?
            }
        };
        log_status!(
            "release",
            "{} {} -> {}",
            outcome.repository,
            outcome.tag,
            outcome.asset.browser_download_url
        );
        *lock(&self.release) = Some(outcome);
        Ok(())
    }
}
