//! Tracker layer: the in-memory domain state and its persistence.
//!
//! # Overview
//!
//! [`HabitTracker`] owns the habit list and completion records, writes every
//! mutation through to a [`LocalStore`](crate::storage::LocalStore), and then
//! notifies listeners. The sync engine registers one listener to schedule a
//! debounced push.
//!
//! # Modules
//!
//! - [`event`]: [`TrackerEvent`] enum and the [`Listeners`] registry.
//! - [`habits`]: [`HabitTracker`] and the default habit set.
//! - [`stats`]: pure streak/total/consistency calculations.

pub mod event;
pub mod habits;
pub mod stats;

pub use event::{ListenerId, Listeners, TrackerEvent};
pub use habits::{default_habits, HabitTracker, Theme};
pub use stats::{
    day_of_week_counts, days_in_month, habit_stats, month_summary, HabitStats, HabitSummary,
    MonthSummary,
};
