use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `~/.local/state/crimp`, or the platform's local data dir without `$HOME`.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("crimp"),
            )
        } else {
            ProjectDirs::from("", "", "crimp").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("state.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("crimp.log"))
    }

    pub fn export_dir() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("exports"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_the_state_dir() {
        let Some(state) = AppDirs::state_dir() else {
            return;
        };
        assert!(state.ends_with("crimp"));
        assert_eq!(AppDirs::db_path().unwrap(), state.join("state.db"));
        assert_eq!(AppDirs::log_path().unwrap(), state.join("crimp.log"));
        assert_eq!(AppDirs::export_dir().unwrap(), state.join("exports"));
    }
}
