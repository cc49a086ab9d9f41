use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Processing,
    Finished,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    /// Position on the success path. `Error` sits past every non-terminal state.
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Downloading => 1,
            JobStatus::Processing => 2,
            JobStatus::Finished | JobStatus::Error => 3,
        }
    }

    pub fn can_advance_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub struct Job {
    pub id: String,
    pub url: String,
    pub format_id: String,
    pub title: String,
    pub status: JobStatus,
    pub progress: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub error: Option<String>,
    /// Set while the job still waits for the backend to hand out its id.
    pub placeholder: bool,
}

impl Job {
    pub fn new(id: String, url: String, format_id: String, title: String) -> Self {
        Self {
            id,
            url,
            format_id,
            title,
            status: JobStatus::Pending,
            progress: 0.0,
            speed: None,
            eta: None,
            error: None,
            placeholder: false,
        }
    }

    pub fn to_info(&self) -> JobInfo {
        JobInfo {
            id: self.id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            status: self.status,
            progress: match self.status {
                JobStatus::Pending | JobStatus::Downloading => Some(self.progress),
                JobStatus::Finished => Some(100.0),
                JobStatus::Processing | JobStatus::Error => None,
            },
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            error: self.error.clone(),
            placeholder: self.placeholder,
        }
    }
}

/// Snapshot handed to event emitters. `progress` is `None` whenever a
/// numeric value would be meaningless (processing, failed).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobInfo {
    pub id: String,
    pub url: String,
    pub title: String,
    pub status: JobStatus,
    pub progress: Option<f64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub error: Option<String>,
    pub placeholder: bool,
}
