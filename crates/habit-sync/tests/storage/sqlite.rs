//! SqliteStore: the same contract as MemoryStore, plus durability.

use habit_sync::storage::{LocalStore, LocalStoreExt, SqliteStore};
use habit_sync::types::Habit;

#[test]
fn in_memory_get_set_remove() {
    let store = SqliteStore::open_in_memory().expect("open in-memory DB");
    assert_eq!(store.get("k").unwrap(), None);

    store.set("k", "v1").unwrap();
    store.set("k", "v2").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

    store.remove("k").unwrap();
    store.remove("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn clear_empties_table() {
    let store = SqliteStore::open_in_memory().expect("open in-memory DB");
    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    store.clear().unwrap();
    assert_eq!(store.get("a").unwrap(), None);
    assert_eq!(store.get("b").unwrap(), None);
}

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("habits.db");

    {
        let store = SqliteStore::open(&path).expect("open");
        store
            .set_json("habits", &vec![Habit::new("h1", "Run", "#68d391")])
            .unwrap();
    }

    let store = SqliteStore::open(&path).expect("reopen");
    let habits: Vec<Habit> = store.get_json("habits").unwrap().unwrap();
    assert_eq!(habits, vec![Habit::new("h1", "Run", "#68d391")]);
}

#[test]
fn unicode_values_are_preserved() {
    let store = SqliteStore::open_in_memory().expect("open in-memory DB");
    store.set("name", "Méditation 🧘").unwrap();
    assert_eq!(store.get("name").unwrap().as_deref(), Some("Méditation 🧘"));
}
