//! Single-flight coordination for downloads and scheduler jobs.
//!
//! One slot per job: an atomic `Idle -> Running` compare-and-swap closes the
//! check-then-spawn race, the stored `JoinHandle` is the liveness re-check
//! for workers that died without resetting, and a drop guard returns the
//! slot to idle on completion or panic. Slots are independent: a model
//! download and a theme download proceed simultaneously; two requests for
//! the same slot collapse to one worker.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::category::Category;

/// Cooperative cancellation flag for one category, checked between chunks
/// and between queued assets. Adapted registry-of-tokens coordination: the
/// engine trips it when the external cancel key appears; the coordinator
/// resets it when a new worker claims the slot.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything the coordinator serializes: one slot per asset category plus
/// one per background scheduler job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Download(Category),
    TimeChecks,
    ThemeRefresh,
    CatalogRefresh,
    SettingsBackup,
    SystemBackup,
}

const SLOT_COUNT: usize = Category::ALL.len() + 5;

impl Job {
    fn index(self) -> usize {
        match self {
            Job::Download(category) => category.index(),
            Job::TimeChecks => Category::ALL.len(),
            Job::ThemeRefresh => Category::ALL.len() + 1,
            Job::CatalogRefresh => Category::ALL.len() + 2,
            Job::SettingsBackup => Category::ALL.len() + 3,
            Job::SystemBackup => Category::ALL.len() + 4,
        }
    }
}

struct Slot {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancelToken,
}

impl Slot {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            cancel: CancelToken::new(),
        }
    }
}

/// Resets the slot's running flag when the worker ends, panicking included.
struct ResetOnDrop(Arc<AtomicBool>);

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Coordinator {
    slots: Vec<Slot>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| Slot::new()).collect(),
        }
    }

    /// Spawn `task` in `job`'s slot unless a worker for it is still alive.
    /// Returns true if a worker was spawned. Never blocks on the worker.
    pub fn run_exclusive<F>(&self, job: Job, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = &self.slots[job.index()];
        // The handle lock serializes spawn decisions; the flag is the cheap
        // published state other callers observe.
        let mut handle = slot.handle.lock().unwrap();

        if slot
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Occupied: trust the flag only if the worker is actually alive.
            if handle.as_ref().is_some_and(|h| !h.is_finished()) {
                return false;
            }
            slot.running.store(true, Ordering::Release);
        }

        slot.cancel.reset();
        let reset = ResetOnDrop(Arc::clone(&slot.running));
        *handle = Some(tokio::spawn(async move {
            let _reset = reset;
            task.await;
        }));
        true
    }

    /// Cancel token for a download slot; clones share the flag.
    pub fn cancel_token(&self, category: Category) -> CancelToken {
        self.slots[Job::Download(category).index()].cancel.clone()
    }

    /// Trip the cancellation flag for an in-flight download.
    pub fn request_cancel(&self, category: Category) {
        self.slots[Job::Download(category).index()].cancel.trip();
    }

    /// Liveness-checked running state for a slot.
    pub fn is_running(&self, job: Job) -> bool {
        let slot = &self.slots[job.index()];
        slot.running.load(Ordering::Acquire)
            && slot
                .handle
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
