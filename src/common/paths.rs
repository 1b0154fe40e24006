//! Configuration and data paths

use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "chutney";

/// Config file looked up in the working directory before the user one
pub const LOCAL_CONFIG_FILE: &str = "chutney.toml";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/chutney/`
/// - macOS: `~/Library/Application Support/chutney/`
/// - Windows: `%APPDATA%\chutney\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the user configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Replace characters that are illegal in file names on any platform
///
/// Control characters and `\ / : * ? " < > |` are dropped.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Sanitize a name used as a single directory level
///
/// Names that would be empty, `.` or `..` after sanitization become `_`.
pub fn sanitize_path_component(name: &str) -> String {
    let clean = sanitize_file_name(name);
    if clean.trim().chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_file() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b:c*d?"), "abcd");
        assert_eq!(sanitize_file_name("search <web> | \"docs\""), "search web  docs");
        assert_eq!(sanitize_file_name("tab\there"), "tabhere");
        assert_eq!(sanitize_file_name("plain name"), "plain name");
    }

    #[test]
    fn test_sanitize_path_component_blocks_traversal() {
        assert_eq!(sanitize_path_component(".."), "_");
        assert_eq!(sanitize_path_component("."), "_");
        assert_eq!(sanitize_path_component("../"), "_");
        assert_eq!(sanitize_path_component(""), "_");
        assert_eq!(sanitize_path_component("DEV.EU"), "DEV.EU");
    }
}
