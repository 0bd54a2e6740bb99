use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::utils::command;

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Source-control state consulted by the release target.
pub trait SourceControl: Send + Sync {
    fn is_repo_github(&self) -> bool;
    fn is_pushed_to_remote(&self) -> bool;
    fn repository_identifier(&self) -> Result<RepoId>;
}

static GITHUB_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:https?://(?:[^@/]+@)?github\.com/|git@github\.com:|ssh://git@github\.com/)([^/\s]+)/([^/\s]+?)(?:\.git)?/?$",
    )
    .expect("Invalid regex pattern")
});

/// Parse `owner/name` out of an HTTPS or SSH GitHub remote URL.
pub fn parse_github_remote(url: &str) -> Option<RepoId> {
    let caps = GITHUB_REMOTE.captures(url.trim())?;
    Some(RepoId {
        owner: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
    })
}

/// Working copy inspected through the `git` binary.
pub struct GitRepository {
    dir: String,
}

impl GitRepository {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }

    fn git(&self, args: &[&str]) -> Option<String> {
        command::run_in_optional(&self.dir, "git", args)
    }

    pub fn origin_url(&self) -> Option<String> {
        self.git(&["remote", "get-url", "origin"])
    }

    pub fn head_sha(&self) -> Option<String> {
        self.git(&["rev-parse", "--short", "HEAD"])
    }

    pub fn latest_tag(&self) -> Option<String> {
        self.git(&["describe", "--tags", "--abbrev=0"])
    }
}

impl SourceControl for GitRepository {
    fn is_repo_github(&self) -> bool {
        self.origin_url()
            .and_then(|url| parse_github_remote(&url))
            .is_some()
    }

    /// HEAD has an upstream and no commits ahead of it.
    fn is_pushed_to_remote(&self) -> bool {
        if self.git(&["rev-parse", "--abbrev-ref", "@{u}"]).is_none() {
            return false;
        }
        self.git(&["rev-list", "--count", "@{u}..HEAD"]).as_deref() == Some("0")
    }

    fn repository_identifier(&self) -> Result<RepoId> {
        let url = self.origin_url().ok_or_else(|| {
            Error::validation_invalid_argument(
                "repository",
                format!("No 'origin' remote configured in {}", self.dir),
                None,
            )
        })?;
        parse_github_remote(&url).ok_or_else(|| {
            Error::validation_invalid_argument(
                "repository",
                format!("Remote '{}' is not a GitHub repository", url),
                Some(url.clone()),
            )
        })
    }
}
