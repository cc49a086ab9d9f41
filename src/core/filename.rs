use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DISPOSITION_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\*\s*=\s*(?:[\w-]+'[\w-]*')?"?([^";]+)"?"#).unwrap());
static DISPOSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).unwrap());

const MAX_STEM_CHARS: usize = 200;
const MAX_EXT_CHARS: usize = 5;

/// Makes a display title safe to use as a file stem.
pub fn sanitize_title(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = WS_RE.replace_all(name.trim(), " ");
    let name = sanitize_filename::sanitize(&name);
    let name: String = name.chars().take(MAX_STEM_CHARS).collect();
    name.trim_end_matches([' ', '-', '.', ';'])
        .trim()
        .to_string()
}

/// File name announced by a `Content-Disposition` header. `filename*`
/// (RFC 5987) wins over plain `filename`.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    if let Some(c) = DISPOSITION_EXT_RE.captures(header) {
        if let Ok(decoded) = urlencoding::decode(c[1].trim()) {
            return Some(decoded.into_owned());
        }
    }
    DISPOSITION_RE
        .captures(header)
        .map(|c| c[1].trim().to_string())
        .filter(|n| !n.is_empty())
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty() && e.len() <= MAX_EXT_CHARS && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|e| e.to_ascii_lowercase())
}

/// Local name for a delivered artifact: the job title, falling back to the
/// server's file stem and then to the task id, plus the server's extension.
pub fn delivery_file_name(title: &str, server_name: Option<&str>, task_id: &str) -> String {
    let mut stem = sanitize_title(title);
    if stem.is_empty() {
        if let Some(server) = server_name {
            let server_stem = Path::new(server)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            stem = sanitize_title(server_stem);
        }
    }
    if stem.is_empty() {
        stem = sanitize_title(task_id);
    }
    if stem.is_empty() {
        stem = "download".to_string();
    }

    match server_name.and_then(extension_of) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_separators() {
        let result = sanitize_title("Video: a/b\\c <HD> | 1080p?");
        for c in ['/', '\\', ':', '<', '>', '|', '?'] {
            assert!(!result.contains(c), "char '{}' should be removed", c);
        }
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_title("  hello   world\t"), "hello world");
    }

    #[test]
    fn sanitize_trims_trailing_punctuation() {
        assert_eq!(sanitize_title("file name - "), "file name");
    }

    #[test]
    fn sanitize_unicode_nfc_normalization() {
        assert_eq!(sanitize_title("e\u{0301}"), "\u{00e9}");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn disposition_plain_and_extended() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="clip_1.mp4""#).as_deref(),
            Some("clip_1.mp4")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename*=UTF-8''caf%C3%A9.mp3").as_deref(),
            Some("café.mp3")
        );
        assert_eq!(
            filename_from_disposition(
                r#"attachment; filename="fallback.mp3"; filename*=utf-8''real.m4a"#
            )
            .as_deref(),
            Some("real.m4a")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn delivery_name_prefers_title() {
        assert_eq!(
            delivery_file_name("clip", Some("3f2a_Some Upload.MP4"), "3f2a"),
            "clip.mp4"
        );
    }

    #[test]
    fn delivery_name_falls_back() {
        assert_eq!(
            delivery_file_name("", Some("Some Upload.webm"), "3f2a"),
            "Some Upload.webm"
        );
        assert_eq!(delivery_file_name("  ", None, "3f2a"), "3f2a");
        assert_eq!(delivery_file_name("clip", Some("weird.ext!"), "id"), "clip");
    }
}
