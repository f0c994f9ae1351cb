//! Output artifact naming.
//!
//! Artifacts live in one flat directory and are addressed by name, so names
//! must never contain path separators.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::operation::EditKind;

/// Extension every produced artifact carries.
pub const OUTPUT_EXTENSION: &str = ".mp4";

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w.-]").expect("valid output name regex"));

/// Strip everything except word characters, dots and dashes, then make sure
/// the name ends in `.mp4`.
///
/// Returns `None` when nothing usable is left (empty or dots only).
pub fn sanitize_output_name(name: &str) -> Option<String> {
    let cleaned = DISALLOWED.replace_all(name, "");
    if cleaned.chars().all(|c| c == '.') {
        return None;
    }

    let mut cleaned = cleaned.into_owned();
    if !cleaned.ends_with(OUTPUT_EXTENSION) {
        cleaned.push_str(OUTPUT_EXTENSION);
    }
    Some(cleaned)
}

/// Name used when a submission does not provide one, e.g. `trim_<uuid>.mp4`.
pub fn default_output_name(kind: EditKind) -> String {
    let prefix = match kind {
        EditKind::Trim => "trim",
        EditKind::RemoveSegment => "remove",
        EditKind::Autoflip => "autoflip",
    };
    format!("{}_{}{}", prefix, Uuid::new_v4(), OUTPUT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize_output_name("clip-1.mp4").as_deref(), Some("clip-1.mp4"));
        assert_eq!(sanitize_output_name("my_clip").as_deref(), Some("my_clip.mp4"));
    }

    #[test]
    fn test_sanitize_strips_path_and_shell_characters() {
        assert_eq!(
            sanitize_output_name("../../etc/passwd").as_deref(),
            Some("....etcpasswd.mp4")
        );
        assert_eq!(sanitize_output_name("a b;c$.mp4").as_deref(), Some("abc.mp4"));
    }

    #[test]
    fn test_sanitize_rejects_empty_results() {
        assert_eq!(sanitize_output_name(""), None);
        assert_eq!(sanitize_output_name("///"), None);
        assert_eq!(sanitize_output_name(".."), None);
    }

    #[test]
    fn test_default_output_name() {
        let name = default_output_name(EditKind::RemoveSegment);
        assert!(name.starts_with("remove_"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(sanitize_output_name(&name).as_deref(), Some(name.as_str()));
    }
}
