use anyhow::Context;
use unidl_core::fs_paths::AppPaths;
use unidl_core::models::settings::AppSettings;

use crate::storage::config;

pub fn get_settings(paths: &dyn AppPaths) -> AppSettings {
    config::load_settings(paths)
}

/// Applies a partial JSON document on top of the stored settings.
pub fn update_settings(paths: &dyn AppPaths, partial: &str) -> anyhow::Result<AppSettings> {
    let current = config::load_settings(paths);

    let patch: serde_json::Value = serde_json::from_str(partial).context("Invalid JSON")?;
    let mut current_val = serde_json::to_value(&current)?;
    merge_json(&mut current_val, &patch);
    let updated: AppSettings =
        serde_json::from_value(current_val).context("Invalid settings")?;
    config::save_settings(paths, &updated)?;

    Ok(updated)
}

pub fn reset_settings(paths: &dyn AppPaths) -> anyhow::Result<AppSettings> {
    let defaults = AppSettings::default();
    config::save_settings(paths, &defaults)?;
    Ok(defaults)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            let nested = value.is_object() && base_obj.get(key).is_some_and(|v| v.is_object());
            if !nested {
                base_obj.insert(key.clone(), value.clone());
            } else if let Some(existing) = base_obj.get_mut(key) {
                merge_json(existing, value);
            }
        }
    }
}
