//! GitHub REST client for releases.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::git::RepoId;
use crate::release::{Asset, NewRelease, Release, ReleaseHost};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

fn transport_error(context: &str, e: reqwest::Error) -> Error {
    Error::http_failed(context, None, e.to_string()).retryable(true)
}

fn api_error(context: &str, status: StatusCode, body: &str) -> Error {
    let err = Error::http_failed(context, Some(status.as_u16()), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            err.with_hint("Check that GitHubToken is valid and has the 'repo' scope")
        }
        s if s.is_server_error() => err.retryable(true),
        _ => err,
    }
}

fn parse_json<T: DeserializeOwned>(context: &str, response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().map_err(|e| transport_error(context, e))?;

    if !status.is_success() {
        return Err(api_error(context, status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| Error::internal_json(e.to_string(), Some(format!("{} response", context))))
}

/// Upload endpoint from a release's `upload_url`, which carries an RFC 6570
/// suffix such as `{?name,label}`.
pub fn upload_endpoint(upload_url: &str) -> &str {
    upload_url.split('{').next().unwrap_or(upload_url)
}

pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(DEFAULT_API_URL, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("shipwright/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| transport_error("GitHub client setup", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn repo_url(&self, repo: &RepoId, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.base_url, repo.owner, repo.name, path)
    }
}

impl ReleaseHost for GitHubClient {
    fn get_release(&self, repo: &RepoId, tag: &str) -> Result<Option<Release>> {
        let context = "GitHub get release";
        let url = self.repo_url(repo, &format!("/releases/tags/{}", tag));
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|e| transport_error(context, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(context, response).map(Some)
    }

    fn create_release(&self, repo: &RepoId, release: &NewRelease) -> Result<Release> {
        let context = "GitHub create release";
        let url = self.repo_url(repo, "/releases");
        let response = self
            .authorized(self.client.post(&url).json(release))
            .send()
            .map_err(|e| transport_error(context, e))?;
        parse_json(context, response)
    }

    fn delete_asset(&self, repo: &RepoId, asset_id: u64) -> Result<()> {
        let context = "GitHub delete asset";
        let url = self.repo_url(repo, &format!("/releases/assets/{}", asset_id));
        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .map_err(|e| transport_error(context, e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(api_error(context, status, &body))
    }

    fn upload_asset(
        &self,
        release: &Release,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Asset> {
        let context = "GitHub upload asset";
        if release.upload_url.is_empty() {
            return Err(Error::http_failed(
                context,
                None,
                format!("release {} has no upload_url", release.id),
            ));
        }
        let response = self
            .authorized(self.client.post(upload_endpoint(&release.upload_url)))
            .query(&[("name", name)])
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .map_err(|e| transport_error(context, e))?;
        parse_json(context, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_endpoint_strips_uri_template() {
        assert_eq!(
            upload_endpoint("https://uploads.github.com/repos/acme/widgets/releases/7/assets{?name,label}"),
            "https://uploads.github.com/repos/acme/widgets/releases/7/assets"
        );
        assert_eq!(upload_endpoint("https://x/assets"), "https://x/assets");
    }

    #[test]
    fn repo_urls_are_rooted_at_base() {
        let client = GitHubClient::with_base_url("https://ghe.example.com/api/v3/", "t").unwrap();
        let repo = RepoId {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
        };
        assert_eq!(
            client.repo_url(&repo, "/releases"),
            "https://ghe.example.com/api/v3/repos/acme/widgets/releases"
        );
    }

    #[test]
    fn release_json_deserializes_with_missing_fields() {
        let release: Release = serde_json::from_str(
            r#"{"id": 1, "tag_name": "v1.2.3", "upload_url": "u{?name}", "assets": [{"id": 5, "name": "app.zip"}]}"#,
        )
        .unwrap();
        assert_eq!(release.assets[0].name, "app.zip");
        assert!(!release.draft);
    }

    #[test]
    fn auth_errors_carry_a_hint() {
        let err = api_error("GitHub get release", StatusCode::UNAUTHORIZED, "Bad credentials");
        assert_eq!(err.details["status"], 401);
        assert!(!err.hints.is_empty());
        assert_eq!(api_error("x", StatusCode::BAD_GATEWAY, "").retryable, Some(true));
    }
}
