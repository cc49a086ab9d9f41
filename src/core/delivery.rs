use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use unidl_core::core::events::DeliveredFile;

use crate::core::backend::BackendClient;
use crate::core::filename;

/// Fetches the artifact of a finished job.
#[async_trait]
pub trait FileDelivery: Send + Sync {
    async fn deliver(&self, task_id: &str, title: &str) -> anyhow::Result<DeliveredFile>;
}

/// Streams `GET /api/download/{id}` into the output directory.
pub struct HttpFileDelivery {
    backend: Arc<BackendClient>,
    output_dir: PathBuf,
}

impl HttpFileDelivery {
    pub fn new(backend: Arc<BackendClient>, output_dir: PathBuf) -> Self {
        Self {
            backend,
            output_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl FileDelivery for HttpFileDelivery {
    async fn deliver(&self, task_id: &str, title: &str) -> anyhow::Result<DeliveredFile> {
        let response = self.backend.download(task_id).await?;

        let server_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename::filename_from_disposition);
        let name = filename::delivery_file_name(title, server_name.as_deref(), task_id);
        let expected = response.content_length();

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("cannot create {}", self.output_dir.display()))?;
        let output = unique_path(&self.output_dir, &name).await;
        let part = part_path_for(&output);

        tracing::debug!("[delivery] {} -> {}", task_id, output.display());

        let written = match write_body(response, &part).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected {
            if written != expected {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(anyhow!(
                    "incomplete download: expected {} bytes, got {}",
                    expected,
                    written
                ));
            }
        }

        tokio::fs::rename(&part, &output)
            .await
            .with_context(|| format!("cannot move file into {}", output.display()))?;

        tracing::info!(
            "[delivery] saved {} ({} bytes)",
            output.display(),
            written
        );

        Ok(DeliveredFile {
            task_id: task_id.to_string(),
            path: output,
            size_bytes: written,
        })
    }
}

async fn write_body(response: reqwest::Response, part: &Path) -> anyhow::Result<u64> {
    let mut file = tokio::fs::File::create(part)
        .await
        .with_context(|| format!("cannot create {}", part.display()))?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("download interrupted")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

fn part_path_for(output: &Path) -> PathBuf {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// `name`, or `name (n)` with the first free `n`.
async fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !exists(&candidate).await {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string();
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 1;
    loop {
        let numbered = match ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dir.join(numbered);
        if !exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
