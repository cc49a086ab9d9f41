use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use unidl_core::models::media::{BackendStatus, LibraryEntry, MediaInfo};
use unidl_core::models::message::{TaskSnapshot, TaskUpdate};
use unidl_core::models::settings::AppSettings;
use url::Url;

use crate::core::http_client;

/// Parameters of `POST /api/prepare`. `start`/`end` are trim boundaries in
/// seconds, `end == 0` meaning "to the end".
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareRequest {
    pub url: String,
    pub format_id: String,
    pub title: String,
    pub start: u64,
    pub end: u64,
}

impl PrepareRequest {
    pub fn new(url: impl Into<String>, format_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format_id: format_id.into(),
            title: String::new(),
            start: 0,
            end: 0,
        }
    }
}

/// Body of `POST /api/metadata`. The backend writes the tags into an
/// mp3, mp4 or m4a file of its library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataUpdate {
    pub filename: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// The part of the backend the tracker drives.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Creates a job and returns the backend's task id.
    async fn prepare(&self, request: &PrepareRequest) -> anyhow::Result<String>;
    /// Current status of a task, for when the push channel is unavailable.
    async fn progress(&self, task_id: &str) -> anyhow::Result<TaskUpdate>;
}

#[derive(Deserialize)]
struct PrepareResponse {
    task_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

pub struct BackendClient {
    client: reqwest::Client,
    base: Url,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(settings: &AppSettings) -> anyhow::Result<Self> {
        let client = http_client::build_client(settings)?;
        Self::with_client(
            client,
            &settings.backend.base_url,
            settings.backend.request_timeout(),
        )
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("invalid backend url '{}'", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            base,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint '{}'", path))
    }

    pub async fn health(&self) -> anyhow::Result<BackendStatus> {
        let response = self
            .client
            .get(self.endpoint("")?)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("backend unreachable")?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn media_info(&self, url: &str) -> anyhow::Result<MediaInfo> {
        let response = self
            .client
            .get(self.endpoint("api/info")?)
            .query(&[("url", url)])
            .timeout(self.request_timeout)
            .send()
            .await
            .context("media info request failed")?;
        Ok(check(response).await?.json().await?)
    }

    /// Starts fetching a finished artifact. The body is left for the caller
    /// to stream.
    pub async fn download(&self, task_id: &str) -> anyhow::Result<reqwest::Response> {
        let path = format!("api/download/{}", urlencoding::encode(task_id));
        let response = self
            .client
            .get(self.endpoint(&path)?)
            .send()
            .await
            .context("download request failed")?;
        check(response).await
    }

    pub async fn library(&self) -> anyhow::Result<Vec<LibraryEntry>> {
        let response = self
            .client
            .get(self.endpoint("api/library")?)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("library request failed")?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn delete_library_item(&self, name: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .delete(self.library_url("api/library", name)?)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("library delete failed")?;
        check(response).await?;
        Ok(())
    }

    pub async fn update_metadata(&self, update: &MetadataUpdate) -> anyhow::Result<()> {
        validate_library_name(&update.filename)?;
        let response = self
            .client
            .post(self.endpoint("api/metadata")?)
            .json(update)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("metadata update failed")?;
        check(response).await?;
        Ok(())
    }

    pub fn library_stream_url(&self, name: &str) -> anyhow::Result<Url> {
        self.library_url("api/library/stream", name)
    }

    fn library_url(&self, prefix: &str, name: &str) -> anyhow::Result<Url> {
        validate_library_name(name)?;
        self.endpoint(&format!("{}/{}", prefix, urlencoding::encode(name)))
    }
}

#[async_trait]
impl JobApi for BackendClient {
    async fn prepare(&self, request: &PrepareRequest) -> anyhow::Result<String> {
        let start = request.start.to_string();
        let end = request.end.to_string();
        let response = self
            .client
            .post(self.endpoint("api/prepare")?)
            .query(&[
                ("url", request.url.as_str()),
                ("format_id", request.format_id.as_str()),
                ("title", request.title.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
            ])
            .timeout(self.request_timeout)
            .send()
            .await
            .context("prepare request failed")?;
        let body: PrepareResponse = check(response).await?.json().await?;
        if body.task_id.is_empty() {
            return Err(anyhow!("backend returned an empty task id"));
        }
        Ok(body.task_id)
    }

    async fn progress(&self, task_id: &str) -> anyhow::Result<TaskUpdate> {
        let path = format!("api/progress/{}", urlencoding::encode(task_id));
        let response = self
            .client
            .get(self.endpoint(&path)?)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("progress request failed")?;
        let snapshot: TaskSnapshot = check(response).await?.json().await?;
        snapshot.into_update(task_id)
    }
}

fn validate_library_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        return Err(anyhow!("invalid library file name '{}'", name));
    }
    Ok(())
}

/// Turns a non-success response into an error carrying the server's
/// `detail` text when there is one.
async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|b| b.detail)
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
    Err(match detail {
        Some(d) => anyhow!("HTTP {}: {}", status.as_u16(), d),
        None => anyhow!("HTTP {}", status.as_u16()),
    })
}
