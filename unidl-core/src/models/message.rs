//! Inbound messages pushed by the backend over the duplex channel.
//!
//! Everything the server sends crosses [`parse_message`] first. A payload
//! either becomes a fully-typed [`ServerMessage`] or is rejected as a whole;
//! partially valid payloads are never patched up.

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::models::job::JobStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// A status report for one backend task.
    Task(TaskUpdate),
    /// Any well-formed message that carries no task status.
    Other { kind: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub task_id: String,
    pub event: TaskEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Pending {
        title: Option<String>,
    },
    Downloading {
        progress: Option<f64>,
        speed: Option<String>,
        eta: Option<String>,
        title: Option<String>,
    },
    Processing {
        title: Option<String>,
    },
    Finished {
        title: Option<String>,
    },
    Error {
        message: Option<String>,
    },
}

impl TaskEvent {
    pub fn status(&self) -> JobStatus {
        match self {
            TaskEvent::Pending { .. } => JobStatus::Pending,
            TaskEvent::Downloading { .. } => JobStatus::Downloading,
            TaskEvent::Processing { .. } => JobStatus::Processing,
            TaskEvent::Finished { .. } => JobStatus::Finished,
            TaskEvent::Error { .. } => JobStatus::Error,
        }
    }

    fn build(status: &str, fields: EventFields) -> anyhow::Result<Self> {
        let EventFields {
            progress,
            speed,
            eta,
            title,
            error,
        } = fields;
        let title = non_empty(title);
        let event = match status {
            "pending" => TaskEvent::Pending { title },
            "downloading" => TaskEvent::Downloading {
                progress: progress.map(|p| p.clamp(0.0, 100.0)),
                speed: non_empty(speed),
                eta: non_empty(eta),
                title,
            },
            "processing" => TaskEvent::Processing { title },
            "finished" => TaskEvent::Finished { title },
            "error" => TaskEvent::Error {
                message: non_empty(error),
            },
            other => return Err(anyhow!("unknown task status '{}'", other)),
        };
        Ok(event)
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "taskId")]
    task_id: Option<String>,
    status: Option<String>,
    #[serde(flatten)]
    fields: EventFields,
}

#[derive(Deserialize)]
struct EventFields {
    progress: Option<f64>,
    speed: Option<String>,
    eta: Option<String>,
    title: Option<String>,
    error: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn parse_message(text: &str) -> anyhow::Result<ServerMessage> {
    let raw: RawMessage = serde_json::from_str(text).context("invalid message payload")?;

    let Some(status) = raw.status else {
        return Ok(ServerMessage::Other { kind: raw.kind });
    };
    let task_id = raw
        .task_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("'{}' message with status but no taskId", raw.kind))?;
    let event = TaskEvent::build(&status, raw.fields)?;

    Ok(ServerMessage::Task(TaskUpdate { task_id, event }))
}

/// Body of `GET /api/progress/{taskId}`. The task id is implied by the URL.
#[derive(Deserialize)]
pub struct TaskSnapshot {
    status: String,
    #[serde(flatten)]
    fields: EventFields,
}

impl TaskSnapshot {
    pub fn into_update(self, task_id: &str) -> anyhow::Result<TaskUpdate> {
        Ok(TaskUpdate {
            task_id: task_id.to_string(),
            event: TaskEvent::build(&self.status, self.fields)?,
        })
    }
}
