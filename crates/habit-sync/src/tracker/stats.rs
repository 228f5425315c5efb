//! Derived statistics over completion records.
//!
//! Everything here is pure: callers pass `today` explicitly so results are
//! deterministic under test.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate};

use crate::types::{parse_date_key, CompletionRecord, Habit, HabitData};

/// Per-habit numbers for one month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HabitStats {
    /// Completions inside the selected month.
    pub month_total: u32,
    /// Consecutive days ending today or yesterday. Zero otherwise.
    pub current_streak: u32,
    /// Longest run of consecutive days across all history.
    pub longest_streak: u32,
    /// `month_total / days_in_month * 100`.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HabitSummary {
    pub habit: Habit,
    pub stats: HabitStats,
}

/// Dashboard numbers for one month across all habits.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthSummary {
    pub days_in_month: u32,
    pub habits: Vec<HabitSummary>,
    /// Index `d - 1` holds the number of habits completed on day `d`.
    pub daily_counts: Vec<u32>,
    pub total_achieved: u32,
    /// `max(habit count, 1) * days_in_month`.
    pub total_possible: u32,
}

impl MonthSummary {
    /// Habits ordered by monthly percentage, best first, at most `limit`.
    pub fn top_habits(&self, limit: usize) -> Vec<&HabitSummary> {
        let mut ranked: Vec<&HabitSummary> = self.habits.iter().collect();
        ranked.sort_by(|a, b| b.stats.percentage.total_cmp(&a.stats.percentage));
        ranked.truncate(limit);
        ranked
    }

    /// Overall completion percentage for the month.
    pub fn completion_rate(&self) -> f64 {
        if self.total_possible == 0 {
            return 0.0;
        }
        f64::from(self.total_achieved) / f64::from(self.total_possible) * 100.0
    }
}

/// Number of days in `month` (1-12) of `year`. Zero for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return 0;
    };
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.map_or(0, |n| (n - first).num_days() as u32)
}

fn month_prefix(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// Compute [`HabitStats`] for one habit's completion dates.
///
/// Dates that do not parse as `YYYY-MM-DD` count toward the month total when
/// their prefix matches but are skipped for streaks.
pub fn habit_stats(dates: &BTreeSet<String>, year: i32, month: u32, today: NaiveDate) -> HabitStats {
    let prefix = month_prefix(year, month);
    let month_total = dates.iter().filter(|d| d.starts_with(&prefix)).count() as u32;

    let mut days: Vec<NaiveDate> = dates.iter().filter_map(|d| parse_date_key(d)).collect();
    days.sort_unstable();
    days.dedup();

    let one_day = Duration::days(1);

    let mut current_streak = 0;
    if let Some(&last) = days.last() {
        if last == today || last == today - one_day {
            current_streak = 1;
            for pair in days.windows(2).rev() {
                if pair[1] - pair[0] == one_day {
                    current_streak += 1;
                } else {
                    break;
                }
            }
        }
    }

    let mut longest_streak = 0;
    let mut run = 0;
    for (i, day) in days.iter().enumerate() {
        run = if i > 0 && *day - days[i - 1] == one_day {
            run + 1
        } else {
            1
        };
        longest_streak = longest_streak.max(run);
    }

    let dim = days_in_month(year, month);
    let percentage = if dim == 0 {
        0.0
    } else {
        f64::from(month_total) / f64::from(dim) * 100.0
    };

    HabitStats {
        month_total,
        current_streak,
        longest_streak,
        percentage,
    }
}

/// Completions per weekday within the month, Sunday first.
pub fn day_of_week_counts(app_data: &CompletionRecord, year: i32, month: u32) -> [u32; 7] {
    let mut counts = [0u32; 7];
    for date in app_data.values().flatten().filter_map(|d| parse_date_key(d)) {
        if date.year() == year && date.month() == month {
            counts[date.weekday().num_days_from_sunday() as usize] += 1;
        }
    }
    counts
}

/// Build the month dashboard numbers for every habit in `data`.
pub fn month_summary(data: &HabitData, year: i32, month: u32, today: NaiveDate) -> MonthSummary {
    let dim = days_in_month(year, month);
    let prefix = month_prefix(year, month);
    let empty = BTreeSet::new();
    let mut daily_counts = vec![0u32; dim as usize];
    let mut total_achieved = 0;
    let mut habits = Vec::with_capacity(data.habits.len());

    for habit in &data.habits {
        let dates = data.app_data.get(&habit.id).unwrap_or(&empty);
        let stats = habit_stats(dates, year, month, today);
        total_achieved += stats.month_total;

        for (day, count) in daily_counts.iter_mut().enumerate() {
            if dates.contains(&format!("{prefix}-{:02}", day + 1)) {
                *count += 1;
            }
        }

        habits.push(HabitSummary {
            habit: habit.clone(),
            stats,
        });
    }

    MonthSummary {
        days_in_month: dim,
        habits,
        daily_counts,
        total_achieved,
        total_possible: (data.habits.len().max(1) as u32) * dim,
    }
}
