use std::time::Duration;

use unidl_core::core::events::{EventEmitter, Notice};

use crate::core::backend::PrepareRequest;
use crate::core::tracker::Tracker;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub url: String,
    pub title: Option<String>,
}

impl BatchEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    pub task_id: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub submitted: Vec<SubmittedJob>,
    pub failed: Vec<BatchFailure>,
}

/// Submits one job per entry, in order, waiting `delay` between requests.
/// A failed submission is reported and skipped; the rest still go out.
pub async fn submit_batch<E: EventEmitter>(
    tracker: &Tracker<E>,
    entries: &[BatchEntry],
    format_id: &str,
    delay: Duration,
) -> BatchReport {
    let shutdown = tracker.shutdown_token();
    let mut report = BatchReport::default();

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("[batch] cancelled after {} of {}", i, entries.len());
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut request = PrepareRequest::new(entry.url.clone(), format_id);
        request.title = entry.title.clone().unwrap_or_default();

        match tracker.submit(&request).await {
            Ok(task_id) => report.submitted.push(SubmittedJob {
                task_id,
                url: entry.url.clone(),
                title: request.title,
            }),
            Err(e) => report.failed.push(BatchFailure {
                url: entry.url.clone(),
                error: format!("{:#}", e),
            }),
        }
    }

    tracing::info!(
        "[batch] {} submitted, {} failed",
        report.submitted.len(),
        report.failed.len()
    );
    if !entries.is_empty() {
        tracker.notify(&Notice::info(format!(
            "Queued {} of {} downloads",
            report.submitted.len(),
            entries.len()
        )));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{FakeApi, FakeDelivery, RecordingEmitter};
    use std::sync::Arc;

    const DELAY: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn failing_entry_does_not_stop_the_batch() {
        let api = Arc::new(FakeApi::default());
        api.fail_url("https://v/2");
        let emitter = RecordingEmitter::default();
        let tracker = Tracker::new(
            api.clone(),
            Arc::new(FakeDelivery::default()),
            emitter.clone(),
            Duration::from_secs(5),
        );
        let entries: Vec<BatchEntry> = ["https://v/1", "https://v/2", "https://v/3"]
            .into_iter()
            .map(BatchEntry::new)
            .collect();

        let report = submit_batch(&tracker, &entries, "best", DELAY).await;

        let ids: Vec<&str> = report.submitted.iter().map(|j| j.task_id.as_str()).collect();
        assert_eq!(ids, vec!["task-1", "task-2"]);
        assert_eq!(report.submitted[1].url, "https://v/3");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].url, "https://v/2");

        let state = tracker.state().await;
        assert_eq!(state.len(), 2);
        assert!(state.iter().all(|job| job.url != "https://v/2"));
        assert_eq!(emitter.errors(), vec!["HTTP 400: unsupported url".to_string()]);

        let prepared = api.prepared.lock().unwrap();
        assert_eq!(prepared.len(), 3);
        assert!(prepared.iter().all(|(req, _)| req.format_id == "best"));
        assert_eq!(prepared[1].1 - prepared[0].1, DELAY);
        assert_eq!(prepared[2].1 - prepared[1].1, DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn titles_are_forwarded() {
        let api = Arc::new(FakeApi::default());
        let tracker = Tracker::new(
            api.clone(),
            Arc::new(FakeDelivery::default()),
            RecordingEmitter::default(),
            Duration::from_secs(5),
        );
        let entries = vec![BatchEntry {
            url: "https://v/1".into(),
            title: Some("Song".into()),
        }];

        let report = submit_batch(&tracker, &entries, "bestaudio", DELAY).await;

        assert_eq!(report.submitted[0].title, "Song");
        let prepared = api.prepared.lock().unwrap();
        assert_eq!(prepared[0].0.title, "Song");
        assert_eq!(prepared[0].0.format_id, "bestaudio");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_remaining_entries() {
        let api = Arc::new(FakeApi::default());
        let tracker = Tracker::new(
            api.clone(),
            Arc::new(FakeDelivery::default()),
            RecordingEmitter::default(),
            Duration::from_secs(5),
        );
        let entries: Vec<BatchEntry> = (0..5)
            .map(|i| BatchEntry::new(format!("https://v/{}", i)))
            .collect();

        let batch_tracker = tracker.clone();
        let batch = tokio::spawn(async move {
            submit_batch(&batch_tracker, &entries, "best", DELAY).await
        });
        tokio::time::sleep(DELAY + DELAY / 2).await;
        tracker.shutdown();

        let report = batch.await.unwrap();
        assert_eq!(report.submitted.len(), 2);
        assert!(report.failed.is_empty());
    }
}
