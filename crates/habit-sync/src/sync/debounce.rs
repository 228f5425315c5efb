//! Debouncer: trailing-edge debounce of a single async action.
//!
//! Each `schedule` aborts the armed task (if its timer has not fired yet) and
//! arms a new one, so a burst of calls inside the delay runs the action once.
//! Once a timer fires, the task detaches itself from the slot: a later
//! `cancel` no longer aborts the action already in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct Debouncer {
    runtime: Handle,
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

#[derive(Default)]
struct Slot {
    /// Bumped on every schedule/cancel; a waking task with an older value
    /// has been superseded.
    generation: u64,
    armed: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(runtime: Handle, delay: Duration) -> Self {
        Self {
            runtime,
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// (Re)arm the timer; `action` runs once the delay elapses with no
    /// further `schedule` or `cancel`.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(armed) = slot.armed.take() {
            armed.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        let delay = self.delay;
        let shared = Arc::clone(&self.slot);

        // Spawned under the slot lock: the task cannot observe the slot
        // before its own handle is stored.
        slot.armed = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.armed = None;
            }
            action().await;
        }));
    }

    /// Disarm the timer. Returns `true` if an action was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        match slot.armed.take() {
            Some(armed) => {
                armed.abort();
                true
            }
            None => false,
        }
    }

    /// A timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().armed.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
