use std::path::PathBuf;

const APP_DIR: &str = "unidl";

pub trait AppPaths: Send + Sync {
    /// Where delivered files land when no output directory is configured.
    fn downloads_dir(&self) -> PathBuf;
    /// Holds `settings.json` and `history.json`.
    fn data_dir(&self) -> PathBuf;

    fn settings_file(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }

    fn history_file(&self) -> PathBuf {
        self.data_dir().join("history.json")
    }
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn downloads_dir(&self) -> PathBuf {
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    fn data_dir(&self) -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Everything under one root directory. Used for portable setups and tests.
pub struct RootedPaths {
    root: PathBuf,
}

impl RootedPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AppPaths for RootedPaths {
    fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}
