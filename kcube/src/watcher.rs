//! Filesystem watcher for a vault's working tree, ignoring `.kcube/`.
//!
//! Grounded on the original daemon's `watchdog.Observer` running on its own
//! thread; `notify` is the Rust-ecosystem analogue. `suspend`/`resume` gate
//! event delivery with an `AtomicBool` rather than tearing down the OS
//! watch, the "ignore window" the spec permits as an alternative to actually
//! stopping the watcher around a restore (spec §5, §9).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CResult, Error};
use crate::util::KCUBE_DIR;

/// A coalesced "something changed under the vault root" notification.
#[derive(Clone, Debug)]
pub struct ChangeEvent;

pub struct VaultWatcher {
    _inner: RecommendedWatcher,
    suspended: Arc<AtomicBool>,
}

impl VaultWatcher {
    /// Spawns an OS-level watch on `root`, forwarding change notifications
    /// (other than ones under `.kcube/`) on `tx` while not suspended.
    pub fn spawn(root: &Path, tx: mpsc::Sender<ChangeEvent>) -> CResult<Self> {
        let suspended = Arc::new(AtomicBool::new(false));
        let suspended_for_handler = suspended.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let Ok(event) = res else { return };
                if suspended_for_handler.load(Ordering::SeqCst) {
                    return;
                }
                if event.paths.iter().any(is_inside_kcube_dir) {
                    return;
                }
                let _ = tx.try_send(ChangeEvent);
            })
            .map_err(|e| Error::Internal(format!("failed to start filesystem watcher: {e}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| Error::Internal(format!("failed to watch {}: {e}", root.display())))?;

        Ok(Self { _inner: watcher, suspended })
    }

    /// Disables event delivery (called before a checkout restore).
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// Re-enables event delivery (called after a checkout restore).
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

fn is_inside_kcube_dir(path: &PathBuf) -> bool {
    path.components().any(|c| c.as_os_str() == KCUBE_DIR)
}
