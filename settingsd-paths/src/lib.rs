//! XDG Base Directory paths for settingsd.
//!
//! The daemon runs inside a desktop session, so everything is resolved
//! through the XDG variables first and falls back to the usual home
//! directory layout.

use std::path::PathBuf;

const APP_DIR: &str = "settingsd";

/// Get the settingsd config directory.
///
/// Returns `$XDG_CONFIG_HOME/settingsd` if set, otherwise `~/.config/settingsd`.
/// This is where the daemon config and the persisted plugin settings live.
///
/// # Examples
///
/// ```
/// use settingsd_paths::config_dir;
///
/// let config = config_dir();
/// let settings = config.join("settings.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".config").join(APP_DIR)
    }
}

/// Get the settingsd data directory.
///
/// Returns `$XDG_DATA_HOME/settingsd` if set, otherwise `~/.local/share/settingsd`.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share").join(APP_DIR)
    } else {
        PathBuf::from(".local/share").join(APP_DIR)
    }
}

/// Directories searched for plugin descriptors, highest precedence first.
///
/// The user's data directory comes first, followed by every entry of
/// `$XDG_DATA_DIRS` (default `/usr/local/share:/usr/share`), each with
/// `settingsd/plugins` appended.
pub fn plugin_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![data_dir().join("plugins")];

    let system = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());

    for base in system.split(':').filter(|s| !s.is_empty()) {
        let dir = PathBuf::from(base).join(APP_DIR).join("plugins");
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_ends_with_settingsd() {
        let path = config_dir();
        assert!(
            path.ends_with("settingsd"),
            "config_dir should end with 'settingsd'"
        );
    }

    #[test]
    #[serial]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        let path = config_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-config/settingsd"));
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_data_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "/tmp/test-data");
        }
        let path = data_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-data/settingsd"));
        unsafe {
            std::env::remove_var("XDG_DATA_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_plugin_dirs_user_first_then_system() {
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "/tmp/user-data");
            std::env::set_var("XDG_DATA_DIRS", "/opt/share::/usr/share");
        }
        let dirs = plugin_dirs();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/tmp/user-data/settingsd/plugins"),
                PathBuf::from("/opt/share/settingsd/plugins"),
                PathBuf::from("/usr/share/settingsd/plugins"),
            ]
        );
        unsafe {
            std::env::remove_var("XDG_DATA_HOME");
            std::env::remove_var("XDG_DATA_DIRS");
        }
    }

    #[test]
    #[serial]
    fn test_plugin_dirs_default_system_dirs() {
        unsafe {
            std::env::remove_var("XDG_DATA_DIRS");
        }
        let dirs = plugin_dirs();
        assert!(dirs.contains(&PathBuf::from("/usr/share/settingsd/plugins")));
        assert!(dirs.contains(&PathBuf::from("/usr/local/share/settingsd/plugins")));
    }
}
