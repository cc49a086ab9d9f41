use std::collections::HashMap;

use anyhow::{anyhow, bail};
use unidl_core::core::timecode;
use unidl_core::models::history::HistoryEntry;
use unidl_core::models::media::{MediaInfo, PlaylistInfo};

use crate::core::backend::PrepareRequest;
use crate::core::batch::{self, BatchEntry, BatchReport};
use crate::core::tracker::JobOutcome;
use crate::Session;

/// One `get` invocation.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub url: String,
    pub format_id: Option<String>,
    pub title: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

pub struct BatchSummary {
    pub report: BatchReport,
    pub outcomes: HashMap<String, JobOutcome>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.report.failed.is_empty() && self.outcomes.values().all(JobOutcome::is_success)
    }
}

pub fn build_request(options: &DownloadOptions, default_format: &str) -> anyhow::Result<PrepareRequest> {
    let url = options.url.trim();
    if url.is_empty() {
        bail!("URL is required");
    }
    let format_id = options
        .format_id
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .unwrap_or(default_format);

    let mut request = PrepareRequest::new(url, format_id);
    request.title = options.title.clone().unwrap_or_default();
    request.start = timecode::parse(options.start.as_deref().unwrap_or(""))?;
    request.end = timecode::parse(options.end.as_deref().unwrap_or(""))?;
    if request.end != 0 && request.end <= request.start {
        bail!(
            "end ({}) must be after start ({})",
            timecode::format(request.end),
            timecode::format(request.start)
        );
    }
    Ok(request)
}

/// Submits one job and waits for it to be delivered or to fail.
pub async fn download(session: &Session, options: &DownloadOptions) -> anyhow::Result<JobOutcome> {
    let mut request = build_request(options, &session.settings.download.default_format_id)?;
    if request.title.is_empty() {
        request.title = resolve_title(session, &request.url).await;
    }

    let task_id = session.tracker.submit(&request).await?;
    remember(session, &request.title, &request.url, &request.format_id).await;

    let mut outcomes = session.tracker.wait_for(std::slice::from_ref(&task_id)).await?;
    outcomes
        .remove(&task_id)
        .ok_or_else(|| anyhow!("no outcome for task {}", task_id))
}

/// Submits every URL with the same format and waits for all of them.
pub async fn download_batch(
    session: &Session,
    urls: &[String],
    format_id: Option<&str>,
) -> anyhow::Result<BatchSummary> {
    let entries: Vec<BatchEntry> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(BatchEntry::new)
        .collect();
    if entries.is_empty() {
        bail!("no URLs given");
    }
    run_batch(session, &entries, format_id).await
}

/// Resolves a playlist URL and downloads every video in it. A URL that turns
/// out to be a single video is downloaded on its own.
pub async fn download_playlist(
    session: &Session,
    url: &str,
    format_id: Option<&str>,
) -> anyhow::Result<BatchSummary> {
    let url = url.trim();
    if url.is_empty() {
        bail!("URL is required");
    }
    let entries = match session.backend.media_info(url).await? {
        MediaInfo::Playlist(playlist) => {
            tracing::info!(
                "[batch] playlist '{}' has {} entries",
                playlist.title,
                playlist.entries.len()
            );
            playlist_batch_entries(&playlist)
        }
        MediaInfo::Video(video) => vec![BatchEntry {
            url: url.to_string(),
            title: Some(video.title).filter(|t| !t.is_empty()),
        }],
    };
    if entries.is_empty() {
        bail!("playlist has no downloadable entries");
    }
    run_batch(session, &entries, format_id).await
}

/// Entries without a URL are skipped; blank titles are left for the backend
/// to fill in.
pub fn playlist_batch_entries(playlist: &PlaylistInfo) -> Vec<BatchEntry> {
    playlist
        .entries
        .iter()
        .filter(|e| !e.url.trim().is_empty())
        .map(|e| BatchEntry {
            url: e.url.trim().to_string(),
            title: e
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
        .collect()
}

async fn run_batch(
    session: &Session,
    entries: &[BatchEntry],
    format_id: Option<&str>,
) -> anyhow::Result<BatchSummary> {
    let format_id = format_id.unwrap_or(session.settings.download.default_format_id.as_str());
    let report = batch::submit_batch(
        &session.tracker,
        entries,
        format_id,
        session.settings.tracker.batch_delay(),
    )
    .await;

    for job in &report.submitted {
        let title = if job.title.is_empty() { &job.url } else { &job.title };
        remember(session, title, &job.url, format_id).await;
    }

    let ids: Vec<String> = report.submitted.iter().map(|j| j.task_id.clone()).collect();
    let outcomes = session.tracker.wait_for(&ids).await?;
    Ok(BatchSummary { report, outcomes })
}

async fn resolve_title(session: &Session, url: &str) -> String {
    match session.backend.media_info(url).await {
        Ok(info) => info.title().to_string(),
        Err(e) => {
            tracing::debug!("no title for {}: {:#}", url, e);
            String::new()
        }
    }
}

async fn remember(session: &Session, title: &str, url: &str, format_id: &str) {
    let title = if title.is_empty() { url } else { title };
    let entry = HistoryEntry::new(title.to_string(), url.to_string(), format_id.to_string());
    if let Err(e) = session.history.record(entry).await {
        tracing::warn!("Failed to update history: {:#}", e);
    }
}
