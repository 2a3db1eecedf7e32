//! Per-session duplicate suppression.
//!
//! The database already refuses a second row per (student, date); the
//! tracker keeps the session from even trying while a student stays in
//! view, and from hammering the store after a failed write.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// What to do with a sighting of a known student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Write an attendance row.
    Mark,
    /// Already has a row for today.
    AlreadyMarked,
    /// A write was attempted too recently.
    CoolingDown,
}

/// Result of a write attempt, fed back into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// The store already held a row for this student and day.
    Duplicate,
    Failed,
}

pub struct AttendanceTracker {
    day: NaiveDate,
    marked_today: HashSet<String>,
    last_attempt: HashMap<String, Instant>,
    cooldown: Duration,
}

impl AttendanceTracker {
    /// Start tracking `day`, seeded with the students the store already has.
    pub fn new(day: NaiveDate, already_marked: HashSet<String>, cooldown: Duration) -> Self {
        Self {
            day,
            marked_today: already_marked,
            last_attempt: HashMap::new(),
            cooldown,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn is_marked(&self, student_id: &str) -> bool {
        self.marked_today.contains(student_id)
    }

    pub fn check(&mut self, student_id: &str, today: NaiveDate, now: Instant) -> Decision {
        if today != self.day {
            tracing::info!(from = %self.day, to = %today, "day rolled over, resetting attendance set");
            self.day = today;
            self.marked_today.clear();
            self.last_attempt.clear();
        }

        if self.marked_today.contains(student_id) {
            return Decision::AlreadyMarked;
        }
        match self.last_attempt.get(student_id) {
            Some(&at) if now.saturating_duration_since(at) < self.cooldown => Decision::CoolingDown,
            _ => Decision::Mark,
        }
    }

    pub fn record(&mut self, student_id: &str, now: Instant, outcome: WriteOutcome) {
        self.last_attempt.insert(student_id.to_string(), now);
        if matches!(outcome, WriteOutcome::Inserted | WriteOutcome::Duplicate) {
            self.marked_today.insert(student_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn tracker() -> AttendanceTracker {
        AttendanceTracker::new(day(2), HashSet::new(), Duration::from_secs(300))
    }

    #[test]
    fn test_first_sighting_marks_then_suppresses() {
        let mut t = tracker();
        let now = Instant::now();
        assert_eq!(t.check("S1", day(2), now), Decision::Mark);
        t.record("S1", now, WriteOutcome::Inserted);
        assert_eq!(t.check("S1", day(2), now + Duration::from_secs(1)), Decision::AlreadyMarked);
        assert_eq!(t.check("S1", day(2), now + Duration::from_secs(3600)), Decision::AlreadyMarked);
        assert_eq!(t.check("S2", day(2), now), Decision::Mark);
    }

    #[test]
    fn test_seeded_students_are_already_marked() {
        let mut t = AttendanceTracker::new(
            day(2),
            HashSet::from(["S7".to_string()]),
            Duration::from_secs(300),
        );
        assert!(t.is_marked("S7"));
        assert_eq!(t.check("S7", day(2), Instant::now()), Decision::AlreadyMarked);
    }

    #[test]
    fn test_failed_write_retries_after_cooldown() {
        let mut t = tracker();
        let now = Instant::now();
        t.record("S1", now, WriteOutcome::Failed);
        assert!(!t.is_marked("S1"));
        assert_eq!(t.check("S1", day(2), now + Duration::from_secs(299)), Decision::CoolingDown);
        assert_eq!(t.check("S1", day(2), now + Duration::from_secs(300)), Decision::Mark);
    }

    #[test]
    fn test_store_duplicate_counts_as_marked() {
        let mut t = tracker();
        let now = Instant::now();
        t.record("S1", now, WriteOutcome::Duplicate);
        assert_eq!(t.check("S1", day(2), now), Decision::AlreadyMarked);
    }

    #[test]
    fn test_day_rollover_resets() {
        let mut t = tracker();
        let now = Instant::now();
        t.record("S1", now, WriteOutcome::Inserted);
        t.record("S2", now, WriteOutcome::Failed);

        assert_eq!(t.check("S1", day(3), now), Decision::Mark);
        assert_eq!(t.day(), day(3));
        assert_eq!(t.check("S2", day(3), now), Decision::Mark);
    }

    #[test]
    fn test_zero_cooldown() {
        let mut t = AttendanceTracker::new(day(2), HashSet::new(), Duration::ZERO);
        let now = Instant::now();
        t.record("S1", now, WriteOutcome::Failed);
        assert_eq!(t.check("S1", day(2), now), Decision::Mark);
    }
}
