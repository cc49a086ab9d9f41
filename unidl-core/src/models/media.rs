use serde::{Deserialize, Serialize};

/// Body of `GET /api/info`: a single video with its formats, or a playlist
/// listing the videos it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaInfo {
    Video(VideoInfo),
    Playlist(PlaylistInfo),
}

impl MediaInfo {
    pub fn title(&self) -> &str {
        match self {
            MediaInfo::Video(v) => &v.title,
            MediaInfo::Playlist(p) => &p.title,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub is_vertical: Option<bool>,
    #[serde(default)]
    pub options: Vec<FormatOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub entries: Vec<PlaylistEntry>,
}

/// One video of a playlist. Flat extraction leaves most fields optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatOption {
    #[serde(rename = "type")]
    pub kind: String,
    pub quality: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub size: String,
    /// Selector to pass to `/api/prepare`; older backends leave it out.
    #[serde(default)]
    pub format_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Video,
    Audio,
    Gif,
}

/// One file in the backend's download directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub size: u64,
    /// Unix timestamp, seconds.
    pub created: f64,
    #[serde(rename = "type")]
    pub kind: LibraryKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatus {
    pub status: String,
}
