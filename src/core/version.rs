//! Version numbers stamped into published artifacts and release tags.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::git::GitRepository;
use crate::params::{Param, Parameters};

pub const FALLBACK_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub semver: String,
    pub informational: String,
    pub assembly: String,
    pub file: String,
    #[serde(skip)]
    parsed: semver::Version,
}

impl VersionInfo {
    /// Normalize a tag such as `v1.2.3` (or bare `1.2`) into the version set.
    pub fn from_tag(tag: &str, sha: Option<&str>) -> Result<Self> {
        let parsed = parse_lenient(tag)?;
        let core = format!("{}.{}.{}", parsed.major, parsed.minor, parsed.patch);
        let semver = {
            let mut v = parsed.clone();
            v.build = semver::BuildMetadata::EMPTY;
            v.to_string()
        };
        let informational = match sha.filter(|s| !s.is_empty()) {
            Some(sha) => format!("{}+{}", semver, sha),
            None => semver.clone(),
        };

        Ok(Self {
            semver,
            informational,
            assembly: format!("{}.0", core),
            file: format!("{}.0", core),
            parsed,
        })
    }

    /// Release tag: `v{major}.{minor}.{patch}`.
    pub fn tag(&self) -> String {
        format!(
            "v{}.{}.{}",
            self.parsed.major, self.parsed.minor, self.parsed.patch
        )
    }
}

fn parse_lenient(tag: &str) -> Result<semver::Version> {
    let raw = tag.trim();
    let raw = raw
        .strip_prefix('v')
        .or_else(|| raw.strip_prefix('V'))
        .unwrap_or(raw);

    if let Ok(v) = semver::Version::parse(raw) {
        return Ok(v);
    }
    // Two-component tags ("1.4") are common on older repositories.
    semver::Version::parse(&format!("{}.0", raw)).map_err(|e| {
        Error::config_invalid_value(
            Param::VERSION,
            Some(tag.to_string()),
            format!("not a semantic version: {}", e),
        )
    })
}

pub trait VersionSource: Send + Sync {
    fn version(&self, params: &Parameters) -> Result<VersionInfo>;
}

/// Latest git tag, overridable by the `Version` parameter.
pub struct GitVersionSource {
    repo: GitRepository,
}

impl GitVersionSource {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            repo: GitRepository::new(dir),
        }
    }
}

impl VersionSource for GitVersionSource {
    fn version(&self, params: &Parameters) -> Result<VersionInfo> {
        let sha = self.repo.head_sha();
        let tag = match params.get(Param::VERSION) {
            Some(explicit) => explicit.to_string(),
            None => self.repo.latest_tag().unwrap_or_else(|| {
                log_status!("version", "No tags found, using {}", FALLBACK_VERSION);
                FALLBACK_VERSION.to_string()
            }),
        };
        VersionInfo::from_tag(&tag, sha.as_deref())
    }
}
