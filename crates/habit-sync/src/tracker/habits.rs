//! HabitTracker: owner of the domain state.
//!
//! Every mutation follows the same order: update memory, write through to the
//! local store, emit a [`TrackerEvent`]. Listeners run after the state lock is
//! released, so they may read the tracker freely.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, TrackerError};
use crate::storage::keys::{CONFIG_KEY, DATA_KEY, SYNC_ENABLED_KEY, THEME_KEY};
use crate::storage::{LocalStore, LocalStoreExt};
use crate::types::{date_key, CompletionRecord, Habit, HabitData};

use super::event::{ListenerId, Listeners, TrackerEvent};

/// Habits seeded on a device that has never stored any.
pub fn default_habits() -> Vec<Habit> {
    vec![
        Habit::new("h1", "Morning Run", "#68d391"),
        Habit::new("h2", "Read 30 Mins", "#a0e7e5"),
        Habit::new("h3", "Meditation", "#fbcfe8"),
        Habit::new("h4", "Drink 3L Water", "#90cdf4"),
        Habit::new("h5", "No Sugar", "#f687b3"),
        Habit::new("h6", "Journal", "#f6ad55"),
        Habit::new("h7", "Learn Spanish", "#9b9cea"),
    ]
}

/// Persisted theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Which parts of the domain state a mutation touched.
#[derive(Clone, Copy)]
enum Touched {
    Habits,
    Data,
    Both,
}

pub struct HabitTracker {
    store: Arc<dyn LocalStore>,
    state: RwLock<HabitData>,
    listeners: Listeners,
}

impl HabitTracker {
    /// Load domain state from `store`.
    ///
    /// Missing keys fall back to [`default_habits`] and empty completions.
    /// Stored JSON that no longer parses is logged and treated as missing.
    pub fn load(store: Arc<dyn LocalStore>) -> Result<Self, TrackerError> {
        let habits = read_or_default(store.as_ref(), CONFIG_KEY, default_habits)?;
        let app_data = read_or_default(store.as_ref(), DATA_KEY, CompletionRecord::new)?;
        debug!(habits = habits.len(), "loaded habit tracker state");
        Ok(Self {
            store,
            state: RwLock::new(HabitData { habits, app_data }),
            listeners: Listeners::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a callback fired after every persisted mutation.
    pub fn on_change(&self, callback: impl Fn(&TrackerEvent) + Send + Sync + 'static) -> ListenerId {
        self.listeners.on(callback)
    }

    pub fn off_change(&self, id: ListenerId) {
        self.listeners.off(id);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn habits(&self) -> Vec<Habit> {
        self.state.read().habits.clone()
    }

    pub fn app_data(&self) -> CompletionRecord {
        self.state.read().app_data.clone()
    }

    /// Consistent copy of habits and completions taken under one lock.
    pub fn snapshot(&self) -> HabitData {
        self.state.read().clone()
    }

    pub fn habit(&self, id: &str) -> Option<Habit> {
        self.state.read().habits.iter().find(|h| h.id == id).cloned()
    }

    pub fn is_completed(&self, habit_id: &str, date: NaiveDate) -> bool {
        self.state
            .read()
            .app_data
            .get(habit_id)
            .is_some_and(|dates| dates.contains(&date_key(date)))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Flip completion of `habit_id` on `date`. Returns the new state.
    pub fn toggle(&self, habit_id: &str, date: NaiveDate) -> Result<bool, TrackerError> {
        let key = date_key(date);
        let completed = {
            let mut state = self.state.write();
            let dates = state.app_data.entry(habit_id.to_string()).or_default();
            if dates.remove(&key) {
                false
            } else {
                dates.insert(key.clone());
                true
            }
        };
        self.commit(
            Touched::Data,
            TrackerEvent::Toggled {
                habit_id: habit_id.to_string(),
                date: key,
                completed,
            },
        )?;
        Ok(completed)
    }

    /// Append a new habit. The name is trimmed and must not be empty.
    pub fn add_habit(&self, name: &str, color: &str) -> Result<Habit, TrackerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptyName);
        }
        let habit = {
            let mut state = self.state.write();
            let mut millis = chrono::Utc::now().timestamp_millis();
            let mut id = format!("h-{millis}");
            while state.habits.iter().any(|h| h.id == id) {
                millis += 1;
                id = format!("h-{millis}");
            }
            let habit = Habit::new(id, name, color);
            state.habits.push(habit.clone());
            habit
        };
        self.commit(
            Touched::Habits,
            TrackerEvent::HabitAdded {
                id: habit.id.clone(),
            },
        )?;
        Ok(habit)
    }

    /// Remove a habit and purge its completion records.
    pub fn delete_habit(&self, id: &str) -> Result<(), TrackerError> {
        {
            let mut state = self.state.write();
            let before = state.habits.len();
            state.habits.retain(|h| h.id != id);
            let purged = state.app_data.remove(id).is_some();
            if before == state.habits.len() && !purged {
                return Err(TrackerError::HabitNotFound(id.to_string()));
            }
        }
        self.commit(Touched::Both, TrackerEvent::HabitRemoved { id: id.to_string() })
    }

    pub fn rename_habit(&self, id: &str, name: &str) -> Result<(), TrackerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptyName);
        }
        self.update_habit(id, |h| h.name = name.to_string())
    }

    pub fn recolor_habit(&self, id: &str, color: &str) -> Result<(), TrackerError> {
        self.update_habit(id, |h| h.color = color.to_string())
    }

    /// Replace habits and completions wholesale and persist both.
    pub fn replace_all(&self, data: HabitData) -> Result<(), TrackerError> {
        *self.state.write() = data;
        self.commit(Touched::Both, TrackerEvent::Replaced)
    }

    /// Drop stored habits, completions and theme, restore the defaults, and
    /// turn cloud sync off.
    ///
    /// The client id and the last sync code are kept, so the user can rejoin.
    /// An attached `SyncEngine` unbinds on the `Reset` event without pushing.
    pub fn reset(&self) -> Result<(), TrackerError> {
        *self.state.write() = HabitData {
            habits: default_habits(),
            app_data: CompletionRecord::new(),
        };
        let removed = [CONFIG_KEY, DATA_KEY, THEME_KEY, SYNC_ENABLED_KEY]
            .iter()
            .try_for_each(|key| self.store.remove(key));
        self.listeners.emit(&TrackerEvent::Reset);
        removed.map_err(TrackerError::from)
    }

    // -----------------------------------------------------------------------
    // Theme
    // -----------------------------------------------------------------------

    pub fn theme(&self) -> Theme {
        match self.store.get(THEME_KEY) {
            Ok(Some(v)) if v == "dark" => Theme::Dark,
            Ok(_) => Theme::Light,
            Err(e) => {
                warn!(error = %e, "failed to read theme preference");
                Theme::Light
            }
        }
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), TrackerError> {
        self.store.set(THEME_KEY, theme.as_str())?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn update_habit(&self, id: &str, f: impl FnOnce(&mut Habit)) -> Result<(), TrackerError> {
        {
            let mut state = self.state.write();
            let habit = state
                .habits
                .iter_mut()
                .find(|h| h.id == id)
                .ok_or_else(|| TrackerError::HabitNotFound(id.to_string()))?;
            f(habit);
        }
        self.commit(Touched::Habits, TrackerEvent::HabitUpdated { id: id.to_string() })
    }

    /// Persist the touched keys, then notify listeners.
    ///
    /// Listeners fire even when persistence fails: memory already holds the
    /// new state and remains the source of truth for rendering and sync.
    fn commit(&self, touched: Touched, event: TrackerEvent) -> Result<(), TrackerError> {
        let persisted = self.persist(touched);
        if let Err(ref e) = persisted {
            warn!(error = %e, ?event, "failed to persist habit tracker state");
        }
        self.listeners.emit(&event);
        persisted.map_err(TrackerError::from)
    }

    fn persist(&self, touched: Touched) -> Result<(), StoreError> {
        let state = self.state.read();
        if matches!(touched, Touched::Habits | Touched::Both) {
            self.store.set_json(CONFIG_KEY, &state.habits)?;
        }
        if matches!(touched, Touched::Data | Touched::Both) {
            self.store.set_json(DATA_KEY, &state.app_data)?;
        }
        Ok(())
    }
}

fn read_or_default<T: serde::de::DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
    default: impl FnOnce() -> T,
) -> Result<T, StoreError> {
    match store.get_json::<T>(key) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(default()),
        Err(StoreError::Corrupt { key, source }) => {
            warn!(%key, error = %source, "stored value is corrupt, using defaults");
            Ok(default())
        }
        Err(e) => Err(e),
    }
}
