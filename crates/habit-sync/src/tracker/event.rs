//! TrackerEvent: a mutation of the domain state, and the listener registry
//! that fans it out.
//!
//! The registry is copied before each emit, so a listener may register or
//! remove listeners (itself included) while being called. A panicking
//! listener is logged and skipped; the rest still hear the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Emitted by `HabitTracker` after each mutation has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A completion date was set or unset.
    Toggled {
        habit_id: String,
        date: String,
        completed: bool,
    },
    HabitAdded { id: String },
    /// A habit and its completion history were removed.
    HabitRemoved { id: String },
    /// A habit was renamed or recolored.
    HabitUpdated { id: String },
    /// Habits and completions were replaced wholesale.
    Replaced,
    /// Domain state was reset to the defaults.
    Reset,
}

impl TrackerEvent {
    /// The habit this event concerns, if it concerns a single one.
    pub fn habit_id(&self) -> Option<&str> {
        match self {
            Self::Toggled { habit_id, .. } => Some(habit_id),
            Self::HabitAdded { id } | Self::HabitRemoved { id } | Self::HabitUpdated { id } => {
                Some(id)
            }
            Self::Replaced | Self::Reset => None,
        }
    }
}

/// Handle returned by [`Listeners::on`], accepted by [`Listeners::off`].
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&TrackerEvent) + Send + Sync>;

/// Change listeners of one `HabitTracker`.
#[derive(Default)]
pub struct Listeners {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    last_id: ListenerId,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, callback: impl Fn(&TrackerEvent) + Send + Sync + 'static) -> ListenerId {
        let mut registry = self.inner.lock();
        registry.last_id += 1;
        let id = registry.last_id;
        registry.entries.push((id, Arc::new(callback)));
        id
    }

    /// Unknown ids are ignored.
    pub fn off(&self, id: ListenerId) {
        self.inner.lock().entries.retain(|(lid, _)| *lid != id);
    }

    pub fn emit(&self, event: &TrackerEvent) {
        let listeners: Vec<(ListenerId, Listener)> = self.inner.lock().entries.clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(listener = id, ?event, "tracker listener panicked");
            }
        }
    }
}
