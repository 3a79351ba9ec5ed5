//! Watches the config file so edits made while running are applied live.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
};
use tracing::{debug, info, warn};

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<()>,
}

fn touches(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

impl ConfigWatcher {
    /// Watch the directory holding `path`, creating it when missing.
    pub fn new(path: &Path) -> Result<Self> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path
            .file_name()
            .context("config path has no file name")?
            .to_os_string();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches(&event, &file_name) => {
                debug!(kind = ?event.kind, "config file changed");
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => warn!("config watcher error: {err}"),
        })
        .context("create config watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", dir.display()))?;
        info!(dir = %dir.display(), "watching config");

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// True when the file changed since the last call. Bursts of events
    /// collapse into one.
    pub fn changed(&self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(()) => changed = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("config watcher stopped");
                    break;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::ffi::OsStr;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_writes_to_the_config_file_count() {
        let name = OsStr::new("config.json");
        assert!(touches(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/config.json"),
            name
        ));
        assert!(touches(
            &event(EventKind::Create(CreateKind::File), "/cfg/config.json"),
            name
        ));
        assert!(!touches(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/config.json.tmp"),
            name
        ));
        assert!(!touches(
            &event(EventKind::Remove(RemoveKind::File), "/cfg/config.json"),
            name
        ));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let watcher = ConfigWatcher::new(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!watcher.changed());
    }
}
