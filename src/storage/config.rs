use std::path::Path;

use anyhow::Context;
use unidl_core::fs_paths::AppPaths;
use unidl_core::models::settings::AppSettings;

/// Reads `settings.json`. A missing or unreadable file yields the defaults.
pub fn load_settings(paths: &dyn AppPaths) -> AppSettings {
    let path = paths.settings_file();
    match read(&path) {
        Ok(Some(settings)) => settings,
        Ok(None) => AppSettings::default(),
        Err(e) => {
            tracing::warn!("Ignoring {}: {:#}", path.display(), e);
            AppSettings::default()
        }
    }
}

fn read(path: &Path) -> anyhow::Result<Option<AppSettings>> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&json)?))
}

pub fn save_settings(paths: &dyn AppPaths, settings: &AppSettings) -> anyhow::Result<()> {
    let path = paths.settings_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
