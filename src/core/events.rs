use unidl_core::core::events::{DeliveredFile, EventEmitter, Notice, NoticeLevel};
use unidl_core::core::format::format_bytes;
use unidl_core::models::job::JobInfo;

/// Emitter for the CLI host: notices and deliveries go to the terminal,
/// queue snapshots to the log.
#[derive(Clone, Default)]
pub struct ConsoleEventEmitter;

impl ConsoleEventEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for ConsoleEventEmitter {
    fn emit_queue_state(&self, items: &[JobInfo]) {
        for job in items {
            match job.progress {
                Some(p) => tracing::info!("[queue] {} {} {:.1}% {}", job.id, job.status, p, job.title),
                None => tracing::info!("[queue] {} {} {}", job.id, job.status, job.title),
            }
        }
    }

    fn emit_notice(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
            NoticeLevel::Success => println!("ok: {}", notice.message),
            NoticeLevel::Info => println!("{}", notice.message),
        }
    }

    fn emit_delivered(&self, file: &DeliveredFile) {
        println!(
            "saved {} ({})",
            file.path.display(),
            format_bytes(file.size_bytes)
        );
    }
}
