//! Configuration file watching for automatic reload.

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// Watches the configuration file and reports modifications.
pub struct ConfigWatcher {
    // Held so the watch stays registered.
    _watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
}

impl ConfigWatcher {
    /// Starts watching `path`.
    pub fn new(path: impl AsRef<Path>) -> notify::Result<Self> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(path.as_ref(), RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Drains pending events, returning true if the file was modified
    /// or rewritten since the last call. Non-blocking.
    pub fn changed(&self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.receiver.try_recv() {
            if let Ok(event) = event {
                if event.kind.is_modify() || event.kind.is_create() {
                    changed = true;
                }
            }
        }
        changed
    }
}
