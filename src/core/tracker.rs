use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};
use unidl_core::core::events::{EventEmitter, Notice};
use unidl_core::core::queue::{JobQueue, Transition};
use unidl_core::models::job::JobInfo;
use unidl_core::models::message::{ServerMessage, TaskUpdate};

use crate::core::backend::{JobApi, PrepareRequest};
use crate::core::connection::ConnectionManager;
use crate::core::delivery::FileDelivery;
use crate::core::registry::Subscription;

/// How a tracked job ended, kept after the job leaves the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Delivered(PathBuf),
    DeliveryFailed(String),
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Delivered(_))
    }
}

struct Inner<E: EventEmitter> {
    queue: Arc<Mutex<JobQueue>>,
    api: Arc<dyn JobApi>,
    delivery: Arc<dyn FileDelivery>,
    emitter: E,
    grace_period: Duration,
    outcomes: watch::Sender<HashMap<String, JobOutcome>>,
    updates: mpsc::UnboundedSender<TaskUpdate>,
    shutdown: CancellationToken,
}

/// Creates jobs on the backend and drives them through the state machine
/// from pushed or polled updates. Clones share the same queue. Dropping the
/// last clone shuts the tracker down.
pub struct Tracker<E: EventEmitter> {
    inner: Arc<Inner<E>>,
    /// `None` on handles held by the tracker's own background tasks.
    guard: Option<Arc<DropGuard>>,
}

impl<E: EventEmitter> Clone for Tracker<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<E: EventEmitter> Tracker<E> {
    /// Must be called from within a tokio runtime: updates are applied by a
    /// background task, one at a time, in arrival order.
    pub fn new(
        api: Arc<dyn JobApi>,
        delivery: Arc<dyn FileDelivery>,
        emitter: E,
        grace_period: Duration,
    ) -> Self {
        let (updates, rx) = mpsc::unbounded_channel();
        let (outcomes, _) = watch::channel(HashMap::new());
        let inner = Arc::new(Inner {
            queue: Arc::new(Mutex::new(JobQueue::new())),
            api,
            delivery,
            emitter,
            grace_period,
            outcomes,
            updates,
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(pump(inner.clone(), rx));
        let guard = Arc::new(inner.shutdown.clone().drop_guard());
        Self {
            inner,
            guard: Some(guard),
        }
    }

    /// A handle for background tasks that must not keep the tracker alive.
    pub(crate) fn detached(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            guard: None,
        }
    }

    /// Feeds every task message of `connection` into this tracker until the
    /// returned handle is dropped.
    pub fn listen(&self, connection: &ConnectionManager) -> Subscription {
        let updates = self.inner.updates.clone();
        connection.subscribe(move |message| {
            if let ServerMessage::Task(update) = message {
                let _ = updates.send(update.clone());
            }
        })
    }

    /// Queues an update from any source (push channel, poller).
    pub fn feed(&self, update: TaskUpdate) {
        let _ = self.inner.updates.send(update);
    }

    /// Asks the backend to prepare a job and starts tracking it. The job is
    /// visible under a placeholder id while the request is in flight.
    pub async fn submit(&self, request: &PrepareRequest) -> anyhow::Result<String> {
        let placeholder = {
            let mut queue = self.inner.queue.lock().await;
            let id = queue.insert_placeholder(
                request.url.clone(),
                request.format_id.clone(),
                request.title.clone(),
            );
            self.inner.emitter.emit_queue_state(&queue.get_state());
            id
        };

        let task_id = match self.inner.api.prepare(request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("[tracker] prepare failed for {}: {:#}", request.url, e);
                let mut queue = self.inner.queue.lock().await;
                queue.discard(&placeholder);
                self.inner.emitter.emit_queue_state(&queue.get_state());
                drop(queue);
                self.inner
                    .emitter
                    .emit_notice(&Notice::error(format!("{:#}", e)));
                return Err(e);
            }
        };

        {
            let mut queue = self.inner.queue.lock().await;
            let reconciled = queue.reconcile(&placeholder, &task_id);
            self.inner.emitter.emit_queue_state(&queue.get_state());
            if !reconciled {
                return Err(anyhow!("task {} is already tracked", task_id));
            }
        }
        tracing::info!("[tracker] {} -> task {}", request.url, task_id);

        // Anything pushed before the id was known has been dropped.
        match self.inner.api.progress(&task_id).await {
            Ok(update) => self.feed(update),
            Err(e) => tracing::debug!("[tracker] catch-up poll for {}: {:#}", task_id, e),
        }

        Ok(task_id)
    }

    /// Starts tracking a task created elsewhere.
    pub async fn track(&self, task_id: &str, url: &str, format_id: &str, title: &str) -> bool {
        let mut queue = self.inner.queue.lock().await;
        let added = queue.track(task_id, url.to_string(), format_id.to_string(), title.to_string());
        if added {
            self.inner.emitter.emit_queue_state(&queue.get_state());
        }
        added
    }

    /// Forgets a job locally. The backend is not told.
    pub async fn clear(&self, id: &str) -> bool {
        let mut queue = self.inner.queue.lock().await;
        let removed = queue.remove(id);
        if removed {
            self.inner.emitter.emit_queue_state(&queue.get_state());
        }
        removed
    }

    pub async fn clear_finished(&self) {
        let mut queue = self.inner.queue.lock().await;
        queue.clear_finished();
        self.inner.emitter.emit_queue_state(&queue.get_state());
    }

    pub async fn state(&self) -> Vec<JobInfo> {
        self.inner.queue.lock().await.get_state()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.queue.lock().await.active_count()
    }

    pub async fn pending_task_ids(&self) -> Vec<String> {
        self.inner.queue.lock().await.pending_task_ids()
    }

    pub fn outcome(&self, id: &str) -> Option<JobOutcome> {
        self.inner.outcomes.borrow().get(id).cloned()
    }

    /// Resolves once every id in `ids` has an outcome.
    pub async fn wait_for(&self, ids: &[String]) -> anyhow::Result<HashMap<String, JobOutcome>> {
        let mut rx = self.inner.outcomes.subscribe();
        let outcomes = tokio::select! {
            _ = self.inner.shutdown.cancelled() => return Err(anyhow!("tracker shut down")),
            done = rx.wait_for(|m| ids.iter().all(|id| m.contains_key(id))) => {
                done.map(|m| m.clone()).map_err(|_| anyhow!("tracker shut down"))?
            }
        };
        Ok(ids
            .iter()
            .filter_map(|id| outcomes.get(id).map(|o| (id.clone(), o.clone())))
            .collect())
    }

    pub fn notify(&self, notice: &Notice) {
        self.inner.emitter.emit_notice(notice);
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Stops applying updates and cancels pending removals.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

async fn pump<E: EventEmitter>(inner: Arc<Inner<E>>, mut rx: mpsc::UnboundedReceiver<TaskUpdate>) {
    loop {
        let update = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            update = rx.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };
        inner.apply(update).await;
    }
    tracing::debug!("[tracker] update pump stopped");
}

impl<E: EventEmitter> Inner<E> {
    async fn apply(self: &Arc<Self>, update: TaskUpdate) {
        let transition = {
            let mut queue = self.queue.lock().await;
            let transition = queue.apply(&update);
            if transition != Transition::Ignored {
                self.emitter.emit_queue_state(&queue.get_state());
            }
            transition
        };

        match transition {
            Transition::Ignored | Transition::Updated => {}
            Transition::Finished { id, title } => {
                tracing::info!("[tracker] task {} finished", id);
                let inner = self.clone();
                let task_id = id.clone();
                tokio::spawn(async move { inner.deliver(task_id, title).await });
                self.schedule_removal(id);
            }
            Transition::Failed { id, message } => {
                tracing::warn!("[tracker] task {} failed: {}", id, message);
                self.emitter.emit_notice(&Notice::error(message.clone()));
                self.record(id, JobOutcome::Failed(message));
            }
        }
    }

    async fn deliver(&self, task_id: String, title: String) {
        match self.delivery.deliver(&task_id, &title).await {
            Ok(file) => {
                self.emitter.emit_delivered(&file);
                self.emitter
                    .emit_notice(&Notice::success(format!("Downloaded {}", display_name(&title, &task_id))));
                self.record(task_id, JobOutcome::Delivered(file.path));
            }
            Err(e) => {
                tracing::error!("[delivery] task {}: {:#}", task_id, e);
                self.emitter.emit_notice(&Notice::error(format!(
                    "Could not save {}: {:#}",
                    display_name(&title, &task_id),
                    e
                )));
                self.record(task_id, JobOutcome::DeliveryFailed(format!("{:#}", e)));
            }
        }
    }

    fn schedule_removal(self: &Arc<Self>, id: String) {
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(inner.grace_period) => {}
            }
            let mut queue = inner.queue.lock().await;
            if queue.remove(&id) {
                inner.emitter.emit_queue_state(&queue.get_state());
            }
        });
    }

    fn record(&self, id: String, outcome: JobOutcome) {
        self.outcomes.send_modify(|m| {
            m.insert(id, outcome);
        });
    }
}

fn display_name<'a>(title: &'a str, task_id: &'a str) -> &'a str {
    if title.trim().is_empty() {
        task_id
    } else {
        title
    }
}
