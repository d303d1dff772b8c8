use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::{self, OpenOptions};
use std::path::Path;

pub const LOG_ENV: &str = "CRIMP_LOG";

/// Sends log output to `path`; the terminal belongs to the TUI.
/// Returns false when the file can't be opened, leaving logging off.
pub fn init(path: &Path) -> bool {
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return false;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(path) else {
        return false;
    };

    let mut builder = Builder::from_env(Env::new().filter_or(LOG_ENV, LevelFilter::Info.as_str()));
    builder
        .format_timestamp_millis()
        .target(Target::Pipe(Box::new(file)));
    builder.try_init().is_ok()
}

/// Captured test logging; safe to call from every test.
pub fn init_for_tests() {
    let _ = Builder::from_env(Env::new().filter_or(LOG_ENV, LevelFilter::Debug.as_str()))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unwritable_path_reports_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        assert!(!init(&blocker.join("crimp.log")));
    }

    #[test]
    fn repeated_test_init_is_harmless() {
        init_for_tests();
        init_for_tests();
        log::debug!("still alive");
    }
}
