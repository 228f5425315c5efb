//! HabitTracker: mutations, persistence and change notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use habit_sync::error::{StoreError, TrackerError};
use habit_sync::storage::keys::{
    CLIENT_ID_KEY, CONFIG_KEY, DATA_KEY, SYNC_ENABLED_KEY, SYNC_ID_KEY, THEME_KEY,
};
use habit_sync::storage::{LocalStore, LocalStoreExt, MemoryStore};
use habit_sync::tracker::{default_habits, HabitTracker, Theme, TrackerEvent};
use habit_sync::types::{CompletionRecord, Habit};

// ============================================================================
// Helpers
// ============================================================================

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn fresh() -> (Arc<MemoryStore>, HabitTracker) {
    let store = Arc::new(MemoryStore::new());
    let tracker = HabitTracker::load(store.clone()).unwrap();
    (store, tracker)
}

fn record_events(tracker: &HabitTracker) -> Arc<Mutex<Vec<TrackerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    tracker.on_change(move |event| sink.lock().push(event.clone()));
    events
}

/// A store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl LocalStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("quota exceeded".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn fresh_device_gets_default_habits() {
    let (_, tracker) = fresh();
    assert_eq!(tracker.habits(), default_habits());
    assert_eq!(tracker.habits().len(), 7);
    assert!(tracker.app_data().is_empty());
}

#[test]
fn loads_persisted_state() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_json(CONFIG_KEY, &vec![Habit::new("x", "Swim", "#0000ff")])
        .unwrap();
    store.set(DATA_KEY, r#"{"x":["2024-06-01","2024-06-01"]}"#).unwrap();

    let tracker = HabitTracker::load(store).unwrap();
    assert_eq!(tracker.habits(), vec![Habit::new("x", "Swim", "#0000ff")]);
    assert!(tracker.is_completed("x", day(1)));
    assert_eq!(tracker.app_data()["x"].len(), 1);
}

#[test]
fn corrupt_state_falls_back_to_defaults() {
    let store = Arc::new(MemoryStore::new());
    store.set(CONFIG_KEY, "[{broken").unwrap();
    store.set(DATA_KEY, "42").unwrap();

    let tracker = HabitTracker::load(store).unwrap();
    assert_eq!(tracker.habits(), default_habits());
    assert!(tracker.app_data().is_empty());
}

// ============================================================================
// Toggle
// ============================================================================

#[test]
fn toggle_parity() {
    let (store, tracker) = fresh();
    for n in 1..=7 {
        let completed = tracker.toggle("h1", day(5)).unwrap();
        assert_eq!(completed, n % 2 == 1);
        assert_eq!(tracker.is_completed("h1", day(5)), n % 2 == 1);
    }
    let stored: CompletionRecord = store.get_json(DATA_KEY).unwrap().unwrap();
    assert_eq!(stored["h1"].len(), 1);
}

#[test]
fn toggle_writes_through() {
    let (store, tracker) = fresh();
    tracker.toggle("h2", day(1)).unwrap();
    tracker.toggle("h2", day(2)).unwrap();

    let reloaded = HabitTracker::load(store).unwrap();
    assert!(reloaded.is_completed("h2", day(1)));
    assert!(reloaded.is_completed("h2", day(2)));
    assert!(!reloaded.is_completed("h2", day(3)));
}

#[test]
fn toggle_emits_event() {
    let (_, tracker) = fresh();
    let events = record_events(&tracker);

    tracker.toggle("h3", day(9)).unwrap();
    tracker.toggle("h3", day(9)).unwrap();

    let events = events.lock();
    assert_eq!(
        *events,
        vec![
            TrackerEvent::Toggled {
                habit_id: "h3".into(),
                date: "2024-06-09".into(),
                completed: true,
            },
            TrackerEvent::Toggled {
                habit_id: "h3".into(),
                date: "2024-06-09".into(),
                completed: false,
            },
        ]
    );
    assert_eq!(events[0].habit_id(), Some("h3"));
}

// ============================================================================
// Habit management
// ============================================================================

#[test]
fn add_habit_trims_and_assigns_unique_ids() {
    let (store, tracker) = fresh();
    let a = tracker.add_habit("  Yoga  ", "#aaaaaa").unwrap();
    let b = tracker.add_habit("Yoga", "#bbbbbb").unwrap();

    assert_eq!(a.name, "Yoga");
    assert!(a.id.starts_with("h-"));
    assert_ne!(a.id, b.id);
    assert_eq!(tracker.habits().len(), 9);

    let stored: Vec<Habit> = store.get_json(CONFIG_KEY).unwrap().unwrap();
    assert_eq!(stored.last(), Some(&b));
}

#[test]
fn add_habit_rejects_blank_name() {
    let (_, tracker) = fresh();
    assert!(matches!(tracker.add_habit("   ", "#fff"), Err(TrackerError::EmptyName)));
    assert_eq!(tracker.habits(), default_habits());
}

#[test]
fn delete_habit_purges_history() {
    let (store, tracker) = fresh();
    tracker.toggle("h4", day(1)).unwrap();
    tracker.delete_habit("h4").unwrap();

    assert!(tracker.habit("h4").is_none());
    assert!(!tracker.app_data().contains_key("h4"));
    let stored: CompletionRecord = store.get_json(DATA_KEY).unwrap().unwrap();
    assert!(!stored.contains_key("h4"));

    assert!(matches!(
        tracker.delete_habit("h4"),
        Err(TrackerError::HabitNotFound(id)) if id == "h4"
    ));
}

#[test]
fn rename_and_recolor() {
    let (_, tracker) = fresh();
    let events = record_events(&tracker);

    tracker.rename_habit("h1", " Evening Run ").unwrap();
    tracker.recolor_habit("h1", "#000000").unwrap();

    let habit = tracker.habit("h1").unwrap();
    assert_eq!(habit.name, "Evening Run");
    assert_eq!(habit.color, "#000000");
    assert_eq!(events.lock().len(), 2);

    assert!(matches!(tracker.rename_habit("h1", ""), Err(TrackerError::EmptyName)));
    assert!(matches!(
        tracker.recolor_habit("nope", "#fff"),
        Err(TrackerError::HabitNotFound(_))
    ));
}

// ============================================================================
// Bulk replacement and reset
// ============================================================================

#[test]
fn replace_all_persists_both_parts() {
    let (store, tracker) = fresh();
    let events = record_events(&tracker);
    let mut data = tracker.snapshot();
    data.habits.truncate(2);
    data.app_data
        .entry("h1".into())
        .or_default()
        .insert("2024-06-30".into());

    tracker.replace_all(data.clone()).unwrap();

    assert_eq!(tracker.snapshot(), data);
    assert_eq!(*events.lock(), vec![TrackerEvent::Replaced]);
    let reloaded = HabitTracker::load(store).unwrap();
    assert_eq!(reloaded.snapshot(), data);
}

#[test]
fn reset_turns_sync_off_and_keeps_identity() {
    let (store, tracker) = fresh();
    store.set(CLIENT_ID_KEY, "client").unwrap();
    store.set(SYNC_ID_KEY, "code").unwrap();
    store.set(SYNC_ENABLED_KEY, "1").unwrap();
    tracker.set_theme(Theme::Dark).unwrap();
    tracker.toggle("h1", day(1)).unwrap();
    tracker.delete_habit("h2").unwrap();
    let events = record_events(&tracker);

    tracker.reset().unwrap();

    assert_eq!(tracker.habits(), default_habits());
    assert!(tracker.app_data().is_empty());
    assert_eq!(tracker.theme(), Theme::Light);
    for key in [CONFIG_KEY, DATA_KEY, THEME_KEY] {
        assert_eq!(store.get(key).unwrap(), None, "{key} should be removed");
    }
    assert_eq!(store.get(CLIENT_ID_KEY).unwrap().as_deref(), Some("client"));
    assert_eq!(store.get(SYNC_ID_KEY).unwrap().as_deref(), Some("code"));
    assert_eq!(store.get(SYNC_ENABLED_KEY).unwrap(), None);
    assert_eq!(*events.lock(), vec![TrackerEvent::Reset]);
}

#[test]
fn theme_round_trip() {
    let (store, tracker) = fresh();
    assert_eq!(tracker.theme(), Theme::Light);
    tracker.set_theme(Theme::Dark).unwrap();
    assert_eq!(tracker.theme(), Theme::Dark);
    assert_eq!(store.get(THEME_KEY).unwrap().as_deref(), Some("dark"));

    store.set(THEME_KEY, "sepia").unwrap();
    assert_eq!(tracker.theme(), Theme::Light);
}

// ============================================================================
// Listener behavior
// ============================================================================

#[test]
fn listeners_fire_even_when_persisting_fails() {
    let store = Arc::new(FlakyStore::default());
    let tracker = HabitTracker::load(store.clone()).unwrap();
    let events = record_events(&tracker);

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = tracker.toggle("h1", day(1)).unwrap_err();
    assert!(matches!(err, TrackerError::Store(StoreError::Backend(_))));

    // Memory holds the new state and listeners were told.
    assert!(tracker.is_completed("h1", day(1)));
    assert_eq!(events.lock().len(), 1);
}

#[test]
fn removed_listener_is_not_called() {
    let (_, tracker) = fresh();
    let events = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&events);
    let id = tracker.on_change(move |_| *sink.lock() += 1);

    tracker.toggle("h1", day(1)).unwrap();
    tracker.off_change(id);
    tracker.toggle("h1", day(2)).unwrap();

    assert_eq!(*events.lock(), 1);
}

#[test]
fn listener_can_read_tracker_during_emit() {
    let (_, tracker) = fresh();
    let tracker = Arc::new(tracker);
    let seen = Arc::new(Mutex::new(None));

    let weak = Arc::downgrade(&tracker);
    let sink = Arc::clone(&seen);
    tracker.on_change(move |_| {
        if let Some(t) = weak.upgrade() {
            *sink.lock() = Some(t.is_completed("h6", NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        }
    });

    tracker.toggle("h6", day(3)).unwrap();
    assert_eq!(*seen.lock(), Some(true));
}

#[test]
fn panicking_listener_does_not_starve_others() {
    let (_, tracker) = fresh();
    tracker.on_change(|_| panic!("listener bug"));
    let events = record_events(&tracker);

    tracker.toggle("h1", day(1)).unwrap();

    assert!(tracker.is_completed("h1", day(1)));
    assert_eq!(events.lock().len(), 1);
}
