//! Publishing a packaged artifact as a release asset.
//!
//! [`publish_release`] is idempotent for a given tag: it reuses an existing
//! release, and an asset with the same name is deleted before the new one is
//! uploaded, so a re-run replaces the asset instead of failing.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::git::RepoId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub name: String,
    pub draft: bool,
    pub prerelease: bool,
}

impl NewRelease {
    /// A published (non-draft, non-prerelease) release named after its tag.
    pub fn published(tag: &str) -> Self {
        Self {
            tag_name: tag.to_string(),
            name: tag.to_string(),
            draft: false,
            prerelease: false,
        }
    }
}

/// Release-hosting service.
pub trait ReleaseHost: Send + Sync {
    /// The release for `tag`, or `None` when there is none.
    fn get_release(&self, repo: &RepoId, tag: &str) -> Result<Option<Release>>;
    fn create_release(&self, repo: &RepoId, release: &NewRelease) -> Result<Release>;
    fn delete_asset(&self, repo: &RepoId, asset_id: u64) -> Result<()>;
    fn upload_asset(
        &self,
        release: &Release,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Asset>;
}

#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub tag: String,
    pub asset_name: String,
    pub content_type: String,
    pub asset_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutcome {
    pub repository: String,
    pub tag: String,
    pub release_id: u64,
    pub created: bool,
    pub replaced_assets: usize,
    pub asset: Asset,
}

pub fn publish_release(
    host: &dyn ReleaseHost,
    repo: &RepoId,
    request: &ReleaseRequest,
) -> Result<ReleaseOutcome> {
    let bytes = fs::read(&request.asset_path).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("read {}", request.asset_path.display())),
        )
    })?;

    let (release, created) = match host.get_release(repo, &request.tag)? {
        Some(existing) => {
            log_status!("release", "Using existing release {} ({})", request.tag, repo);
            (existing, false)
        }
        None => {
            log_status!("release", "Creating release {} ({})", request.tag, repo);
            (host.create_release(repo, &NewRelease::published(&request.tag))?, true)
        }
    };

    let stale: Vec<&Asset> = release
        .assets
        .iter()
        .filter(|a| a.name == request.asset_name)
        .collect();
    for asset in &stale {
        log_status!("release", "Deleting existing asset {} (id {})", asset.name, asset.id);
        host.delete_asset(repo, asset.id)?;
    }

    log_status!(
        "release",
        "Uploading {} ({} bytes)",
        request.asset_name,
        bytes.len()
    );
    let asset = host.upload_asset(&release, &request.asset_name, &request.content_type, bytes)?;

    Ok(ReleaseOutcome {
        repository: repo.to_string(),
        tag: request.tag.clone(),
        release_id: release.id,
        created,
        replaced_assets: stale.len(),
        asset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryHost {
        releases: Mutex<Vec<Release>>,
        calls: Mutex<Vec<String>>,
    }

    impl ReleaseHost for MemoryHost {
        fn get_release(&self, _repo: &RepoId, tag: &str) -> Result<Option<Release>> {
            self.calls.lock().unwrap().push(format!("get {}", tag));
            Ok(self
                .releases
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.tag_name == tag)
                .cloned())
        }

        fn create_release(&self, _repo: &RepoId, release: &NewRelease) -> Result<Release> {
            self.calls.lock().unwrap().push(format!("create {}", release.tag_name));
            let created = Release {
                id: 7,
                tag_name: release.tag_name.clone(),
                name: Some(release.name.clone()),
                draft: release.draft,
                prerelease: release.prerelease,
                upload_url: String::new(),
                assets: Vec::new(),
            };
            self.releases.lock().unwrap().push(created.clone());
            Ok(created)
        }

        fn delete_asset(&self, _repo: &RepoId, asset_id: u64) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {}", asset_id));
            Ok(())
        }

        fn upload_asset(&self, _r: &Release, name: &str, _ct: &str, bytes: Vec<u8>) -> Result<Asset> {
            self.calls.lock().unwrap().push(format!("upload {}", name));
            Ok(Asset {
                id: 100,
                name: name.to_string(),
                size: bytes.len() as u64,
                browser_download_url: String::new(),
            })
        }
    }

    fn repo() -> RepoId {
        RepoId {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
        }
    }

    fn request(dir: &tempfile::TempDir) -> ReleaseRequest {
        let path = dir.path().join("app.zip");
        fs::write(&path, b"zipbytes").unwrap();
        ReleaseRequest {
            tag: "v1.2.3".to_string(),
            asset_name: "app.zip".to_string(),
            content_type: "application/zip".to_string(),
            asset_path: path,
        }
    }

    #[test]
    fn creates_published_release_when_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let host = MemoryHost::default();

        let outcome = publish_release(&host, &repo(), &request(&dir)).unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.asset.size, 8);
        let releases = host.releases.lock().unwrap();
        assert!(!releases[0].draft && !releases[0].prerelease);
        assert_eq!(
            *host.calls.lock().unwrap(),
            vec!["get v1.2.3", "create v1.2.3", "upload app.zip"]
        );
    }

    #[test]
    fn replaces_same_named_asset_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let host = MemoryHost::default();
        host.releases.lock().unwrap().push(Release {
            id: 3,
            tag_name: "v1.2.3".to_string(),
            name: None,
            draft: false,
            prerelease: false,
            upload_url: String::new(),
            assets: vec![
                Asset {
                    id: 41,
                    name: "app.zip".to_string(),
                    size: 1,
                    browser_download_url: String::new(),
                },
                Asset {
                    id: 42,
                    name: "notes.txt".to_string(),
                    size: 1,
                    browser_download_url: String::new(),
                },
            ],
        });

        let outcome = publish_release(&host, &repo(), &request(&dir)).unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.replaced_assets, 1);
        assert_eq!(
            *host.calls.lock().unwrap(),
            vec!["get v1.2.3", "delete 41", "upload app.zip"]
        );
    }

    #[test]
    fn missing_asset_file_fails_before_any_call() {
        let host = MemoryHost::default();
        let req = ReleaseRequest {
            tag: "v1.0.0".to_string(),
            asset_name: "app.zip".to_string(),
            content_type: "application/zip".to_string(),
            asset_path: PathBuf::from("/definitely/not/here.zip"),
        };
        let err = publish_release(&host, &repo(), &req).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InternalIoError);
        assert!(host.calls.lock().unwrap().is_empty());
    }
}
