//! Removal dispatcher
//!
//! Evicted entries are deleted from disk by a small fixed pool of worker
//! threads so slow deletes never sit on a caller's insertion path.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::cached_file::CachedFile;
use super::errors::CacheError;

/// Number of removal worker threads
pub const REMOVAL_THREADS: usize = 4;

/// Count of dispatched removals that have not finished yet
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn start(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Fixed pool of threads deleting evicted entries
pub struct RemovalDispatcher {
    sender: Option<Sender<CachedFile>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
    root: PathBuf,
}

impl RemovalDispatcher {
    /// Start the worker threads
    ///
    /// # Arguments
    /// * `root` - Cache root; empty parents are pruned up to (not including) it
    /// * `threads` - Number of workers
    pub fn new(root: PathBuf, threads: usize) -> Result<Self, CacheError> {
        let (sender, receiver) = unbounded::<CachedFile>();
        let pending = Arc::new(Pending::default());

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let receiver = receiver.clone();
            let pending = pending.clone();
            let root = root.clone();
            let handle = std::thread::Builder::new()
                .name(format!("local-file-cache-removal-{}", i))
                .spawn(move || {
                    for file in receiver.iter() {
                        file.remove(&root);
                        pending.finish();
                    }
                })
                .map_err(|e| CacheError::storage("failed to start removal thread", e))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
            pending,
            root,
        })
    }

    /// Queue an entry for deletion
    pub fn dispatch(&self, file: CachedFile) {
        debug!(url = %file.url(), local = %file.local_path().display(), "Scheduling removal");
        self.pending.start();

        let Some(sender) = &self.sender else {
            file.remove(&self.root);
            self.pending.finish();
            return;
        };

        if let Err(e) = sender.send(file) {
            // workers are gone, remove inline
            warn!("Removal workers unavailable, removing on caller thread");
            e.into_inner().remove(&self.root);
            self.pending.finish();
        }
    }

    /// Number of removals queued or running
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Block until every dispatched removal has finished
    ///
    /// # Returns
    /// false if removals were still pending when `timeout` elapsed
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pending.idle.wait_for(&mut count, deadline - now);
        }
        true
    }
}

impl Drop for RemovalDispatcher {
    fn drop(&mut self) {
        // closing the channel lets the workers drain the queue and exit
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Removal worker panicked");
            }
        }
    }
}
