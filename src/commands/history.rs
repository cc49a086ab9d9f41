use unidl_core::models::history::HistoryEntry;

use crate::storage::history::HistoryStore;

pub async fn get_history(store: &HistoryStore) -> anyhow::Result<Vec<HistoryEntry>> {
    store.load().await
}

pub async fn remove_history_entry(store: &HistoryStore, id: i64) -> anyhow::Result<()> {
    if !store.remove(id).await? {
        anyhow::bail!("no history entry with id {}", id);
    }
    Ok(())
}

pub async fn clear_history(store: &HistoryStore) -> anyhow::Result<()> {
    store.clear().await
}
