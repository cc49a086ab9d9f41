//! In-memory stand-ins for the network seams.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use unidl_core::core::events::{DeliveredFile, EventEmitter, Notice, NoticeLevel};
use unidl_core::models::job::JobInfo;
use unidl_core::models::message::TaskUpdate;

use crate::core::backend::{JobApi, PrepareRequest};
use crate::core::delivery::FileDelivery;
use crate::core::filename;
use crate::core::transport::{Channel, Transport};

type Frame = Result<String, String>;

pub struct FakeTransport {
    attempts: Mutex<Vec<(String, Instant)>>,
    refuse: AtomicBool,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

/// The backend's side of one accepted channel. Dropping it closes the channel.
pub struct ServerEnd {
    pub url: String,
    tx: mpsc::UnboundedSender<Frame>,
}

impl ServerEnd {
    pub fn send(&self, text: &str) {
        let _ = self.tx.send(Ok(text.to_string()));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(reason.to_string()));
    }

    pub fn hang_up(self) {}
}

struct FakeChannel {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Channel for FakeChannel {
    async fn next_text(&mut self) -> Option<anyhow::Result<String>> {
        self.rx.recv().await.map(|frame| frame.map_err(|e| anyhow!(e)))
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
            accepted,
        });
        (transport, rx)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &str) -> anyhow::Result<Box<dyn Channel>> {
        self.attempts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if self.refuse.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd {
            url: url.to_string(),
            tx,
        });
        Ok(Box::new(FakeChannel { rx }))
    }
}

#[derive(Clone, Default)]
pub struct RecordingEmitter {
    pub states: Arc<Mutex<Vec<Vec<JobInfo>>>>,
    pub notices: Arc<Mutex<Vec<Notice>>>,
    pub delivered: Arc<Mutex<Vec<DeliveredFile>>>,
}

impl RecordingEmitter {
    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn saw_id(&self, id: &str) -> bool {
        self.states
            .lock()
            .unwrap()
            .iter()
            .any(|state| state.iter().any(|job| job.id == id))
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_queue_state(&self, items: &[JobInfo]) {
        self.states.lock().unwrap().push(items.to_vec());
    }

    fn emit_notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }

    fn emit_delivered(&self, file: &DeliveredFile) {
        self.delivered.lock().unwrap().push(file.clone());
    }
}

#[derive(Default)]
pub struct FakeApi {
    next_id: AtomicUsize,
    failing_urls: Mutex<HashSet<String>>,
    snapshots: Mutex<HashMap<String, TaskUpdate>>,
    pub prepared: Mutex<Vec<(PrepareRequest, Instant)>>,
    pub progress_calls: AtomicUsize,
}

impl FakeApi {
    pub fn fail_url(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn set_snapshot(&self, update: TaskUpdate) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(update.task_id.clone(), update);
    }
}

#[async_trait]
impl JobApi for FakeApi {
    async fn prepare(&self, request: &PrepareRequest) -> anyhow::Result<String> {
        self.prepared
            .lock()
            .unwrap()
            .push((request.clone(), Instant::now()));
        if self.failing_urls.lock().unwrap().contains(&request.url) {
            return Err(anyhow!("HTTP 400: unsupported url"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("task-{}", n))
    }

    async fn progress(&self, task_id: &str) -> anyhow::Result<TaskUpdate> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshots
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| anyhow!("HTTP 404: Task not found"))
    }
}

#[derive(Default)]
pub struct FakeDelivery {
    pub calls: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl FakeDelivery {
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FileDelivery for FakeDelivery {
    async fn deliver(&self, task_id: &str, title: &str) -> anyhow::Result<DeliveredFile> {
        self.calls
            .lock()
            .unwrap()
            .push((task_id.to_string(), title.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("HTTP 404: File not ready or task not found"));
        }
        Ok(DeliveredFile {
            task_id: task_id.to_string(),
            path: PathBuf::from(filename::delivery_file_name(title, Some("x.mp4"), task_id)),
            size_bytes: 0,
        })
    }
}
