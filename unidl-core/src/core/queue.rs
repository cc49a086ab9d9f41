use crate::models::job::{Job, JobInfo, JobStatus};
use crate::models::message::{TaskEvent, TaskUpdate};

const PLACEHOLDER_PREFIX: &str = "local-";
pub const FALLBACK_ERROR: &str = "Download failed";

/// What applying one update did to the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Unknown id, terminal job, or a step backwards.
    Ignored,
    Updated,
    Finished { id: String, title: String },
    Failed { id: String, message: String },
}

pub struct JobQueue {
    pub items: Vec<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Registers a job before the backend has assigned it an id.
    pub fn insert_placeholder(&mut self, url: String, format_id: String, title: String) -> String {
        let id = format!("{}{}", PLACEHOLDER_PREFIX, uuid::Uuid::new_v4());
        let mut job = Job::new(id.clone(), url, format_id, title);
        job.placeholder = true;
        self.items.push(job);
        id
    }

    /// Swaps a placeholder id for the id the backend returned.
    pub fn reconcile(&mut self, placeholder_id: &str, task_id: &str) -> bool {
        if self.contains(task_id) {
            self.discard(placeholder_id);
            return false;
        }
        match self
            .items
            .iter_mut()
            .find(|j| j.id == placeholder_id && j.placeholder)
        {
            Some(job) => {
                job.id = task_id.to_string();
                job.placeholder = false;
                true
            }
            None => false,
        }
    }

    pub fn discard(&mut self, placeholder_id: &str) -> bool {
        let before = self.items.len();
        self.items
            .retain(|j| !(j.id == placeholder_id && j.placeholder));
        self.items.len() != before
    }

    /// Tracks a job whose backend id is already known.
    pub fn track(&mut self, task_id: &str, url: String, format_id: String, title: String) -> bool {
        if self.contains(task_id) {
            return false;
        }
        self.items
            .push(Job::new(task_id.to_string(), url, format_id, title));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|j| j.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.items.iter().find(|j| j.id == id)
    }

    pub fn apply(&mut self, update: &TaskUpdate) -> Transition {
        let Some(job) = self
            .items
            .iter_mut()
            .find(|j| !j.placeholder && j.id == update.task_id)
        else {
            return Transition::Ignored;
        };

        let next = update.event.status();
        if !job.status.can_advance_to(next) {
            return Transition::Ignored;
        }

        match &update.event {
            TaskEvent::Pending { title } => {
                if let Some(t) = title {
                    job.title = t.clone();
                }
                Transition::Updated
            }
            TaskEvent::Downloading {
                progress,
                speed,
                eta,
                title,
            } => {
                job.status = JobStatus::Downloading;
                if let Some(p) = progress {
                    job.progress = *p;
                }
                if let Some(t) = title {
                    job.title = t.clone();
                }
                job.speed = speed.clone();
                job.eta = eta.clone();
                Transition::Updated
            }
            TaskEvent::Processing { title } => {
                job.status = JobStatus::Processing;
                if let Some(t) = title {
                    job.title = t.clone();
                }
                job.speed = None;
                job.eta = None;
                Transition::Updated
            }
            TaskEvent::Finished { title } => {
                job.status = JobStatus::Finished;
                job.progress = 100.0;
                if let Some(t) = title {
                    job.title = t.clone();
                }
                job.speed = None;
                job.eta = None;
                Transition::Finished {
                    id: job.id.clone(),
                    title: job.title.clone(),
                }
            }
            TaskEvent::Error { message } => {
                let message = message
                    .clone()
                    .unwrap_or_else(|| FALLBACK_ERROR.to_string());
                job.status = JobStatus::Error;
                job.error = Some(message.clone());
                job.speed = None;
                job.eta = None;
                Transition::Failed {
                    id: job.id.clone(),
                    message,
                }
            }
        }
    }

    /// Local removal only; the backend keeps whatever it is doing.
    pub fn remove(&mut self, id: &str) -> bool {
        if let Some(pos) = self.items.iter().position(|j| j.id == id) {
            self.items.remove(pos);
            return true;
        }
        false
    }

    pub fn clear_finished(&mut self) {
        self.items.retain(|j| !j.status.is_terminal());
    }

    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|j| !j.status.is_terminal()).count()
    }

    /// Ids the backend knows about that have not reached a terminal state.
    pub fn pending_task_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|j| !j.placeholder && !j.status.is_terminal())
            .map(|j| j.id.clone())
            .collect()
    }

    pub fn get_state(&self) -> Vec<JobInfo> {
        self.items.iter().map(|j| j.to_info()).collect()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
