use unidl_core::models::media::LibraryEntry;

use crate::core::backend::{BackendClient, MetadataUpdate};

/// Newest first.
pub async fn list_library(backend: &BackendClient) -> anyhow::Result<Vec<LibraryEntry>> {
    let mut entries = backend.library().await?;
    entries.sort_by(|a, b| b.created.total_cmp(&a.created));
    Ok(entries)
}

pub async fn delete_library_item(backend: &BackendClient, name: &str) -> anyhow::Result<()> {
    backend.delete_library_item(name).await?;
    tracing::info!("Deleted {} from library", name);
    Ok(())
}

pub fn library_stream_url(backend: &BackendClient, name: &str) -> anyhow::Result<String> {
    Ok(backend.library_stream_url(name)?.to_string())
}

pub async fn update_metadata(backend: &BackendClient, update: &MetadataUpdate) -> anyhow::Result<()> {
    if update.title.trim().is_empty() {
        anyhow::bail!("title is required");
    }
    backend.update_metadata(update).await?;
    tracing::info!("Updated tags of {}", update.filename);
    Ok(())
}
