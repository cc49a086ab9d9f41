use serde::Serialize;

use crate::models::job::JobInfo;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient, user-facing notification.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeliveredFile {
    pub task_id: String,
    pub path: std::path::PathBuf,
    pub size_bytes: u64,
}

pub trait EventEmitter: Send + Sync + Clone + 'static {
    fn emit_queue_state(&self, items: &[JobInfo]);
    fn emit_notice(&self, notice: &Notice);
    fn emit_delivered(&self, _file: &DeliveredFile) {}
}
