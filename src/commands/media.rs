use unidl_core::models::media::{BackendStatus, MediaInfo};

use crate::core::backend::BackendClient;

pub async fn get_media_info(backend: &BackendClient, url: &str) -> anyhow::Result<MediaInfo> {
    let url = url.trim();
    if url.is_empty() {
        anyhow::bail!("URL is required");
    }
    backend.media_info(url).await
}

pub async fn check_backend(backend: &BackendClient) -> anyhow::Result<BackendStatus> {
    backend.health().await
}
