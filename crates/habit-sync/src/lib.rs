//! Habit tracking with last-writer-wins sync of the full state through one
//! shared remote document per sync code.

pub mod config;
pub mod error;
pub mod types;

pub mod remote;
pub mod storage;
pub mod sync;
pub mod tracker;
