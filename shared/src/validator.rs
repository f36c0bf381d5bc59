use chrono::{DateTime, Days, Utc};

use crate::{Day, FINAL_DAY};

const TAG_SUFFIX: &str = "/100]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub accepted: bool,
    pub message: String,
}

impl Validation {
    fn accept(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    fn reject(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

/// Extracts `d` from a post that starts with `[d/100]`.
pub fn parse_progress_tag(text: &str) -> Option<Day> {
    let rest = text.trim().strip_prefix('[')?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 || !rest[digits_end..].starts_with(TAG_SUFFIX) {
        return None;
    }

    // Overflowing digit runs are simply out of range
    let day: u64 = rest[..digits_end].parse().ok()?;
    (1..=FINAL_DAY as u64)
        .contains(&day)
        .then_some(day as Day)
}

pub fn validate_progression(current_day: Day, candidate_day: Day, is_new_user: bool) -> Validation {
    if is_new_user {
        return if candidate_day == 1 {
            Validation::accept("Welcome to the 100 Days of Code challenge!")
        } else {
            Validation::reject("New participants must start with [1/100]")
        };
    }

    let next = current_day + 1;
    if candidate_day == next {
        Validation::accept(format!(
            "Great progress! Day {candidate_day} logged successfully."
        ))
    } else if candidate_day <= current_day {
        Validation::reject(format!(
            "You've already completed day {current_day}. Next post should be [{next}/100]"
        ))
    } else {
        Validation::reject(format!(
            "You can't skip ahead! You're on day {current_day}, next should be [{next}/100]"
        ))
    }
}

/// The challenge resets at 00:00 UTC, so only the calendar date matters:
/// 23:59 followed by 00:01 is fine, 00:01 followed by 23:59 is not.
pub fn validate_time_window(last_post: DateTime<Utc>, now: DateTime<Utc>) -> Validation {
    if now.date_naive() > last_post.date_naive() {
        return Validation::accept("");
    }

    let reset = next_reset(now)
        .map(|reset| format!(" [<t:{}:t>]", reset.timestamp()))
        .unwrap_or_default();
    Validation::reject(format!(
        "You've already posted today. Please come back after 00:00 UTC{reset} for your next update!"
    ))
}

/// The next 00:00 UTC strictly after `now`.
pub fn next_reset(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tomorrow = now.date_naive().checked_add_days(Days::new(1))?;
    Some(tomorrow.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Whole days elapsed since `last_post`, rounded down.
pub fn days_inactive(last_post: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_post).num_days()
}

pub const fn is_milestone(day: Day) -> bool {
    day % 10 == 0 && day < FINAL_DAY
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn parses_every_valid_day() {
        for day in 1..=100 {
            assert_eq!(parse_progress_tag(&format!("[{day}/100]")), Some(day));
            assert_eq!(
                parse_progress_tag(&format!("  \n[{day}/100] did some rust\n")),
                Some(day)
            );
        }
    }

    #[test]
    fn rejects_malformed_tags() {
        let inputs = [
            "[0/100]",
            "[101/100]",
            "1/100",
            "[1/99]",
            "[1/1000]",
            "[/100]",
            "[ 1/100]",
            "[1 /100]",
            "today [1/100]",
            "[-1/100]",
            "[99999999999999999999999/100]",
            "",
            "[",
        ];
        for input in inputs {
            assert_eq!(parse_progress_tag(input), None, "{input}");
        }
    }

    #[test]
    fn leading_zeroes_are_digits() {
        assert_eq!(parse_progress_tag("[007/100] bond"), Some(7));
        assert_eq!(parse_progress_tag("[0100/100]"), Some(100));
    }

    #[test]
    fn new_user_progression() {
        assert!(validate_progression(0, 1, true).accepted);
        let result = validate_progression(0, 2, true);
        assert!(!result.accepted);
        assert!(result.message.contains("[1/100]"));
    }

    #[test]
    fn existing_user_progression() {
        assert!(validate_progression(5, 6, false).accepted);

        let repeated = validate_progression(5, 5, false);
        assert!(!repeated.accepted);
        assert!(repeated.message.contains("already completed day 5"));

        let backwards = validate_progression(5, 2, false);
        assert!(!backwards.accepted);
        assert!(backwards.message.contains("already completed"));

        let skipped = validate_progression(5, 7, false);
        assert!(!skipped.accepted);
        assert!(skipped.message.contains("skip ahead"));
        assert!(skipped.message.contains("[6/100]"));
    }

    #[test]
    fn same_instant_is_rejected() {
        let t = at(2024, 3, 10, 12, 0);
        assert!(!validate_time_window(t, t).accepted);
    }

    #[test]
    fn midnight_rollover_is_accepted() {
        assert!(validate_time_window(at(2024, 1, 1, 23, 59), at(2024, 1, 2, 0, 1)).accepted);
    }

    #[test]
    fn same_date_is_rejected_even_hours_apart() {
        let result = validate_time_window(at(2024, 1, 1, 0, 1), at(2024, 1, 1, 23, 59));
        assert!(!result.accepted);
        // 2024-01-02T00:00:00Z
        assert!(result.message.contains("<t:1704153600:t>"));
    }

    #[test]
    fn clock_going_backwards_is_rejected() {
        assert!(!validate_time_window(at(2024, 1, 2, 10, 0), at(2024, 1, 1, 10, 0)).accepted);
    }

    #[test]
    fn inactivity_is_floored() {
        let last = at(2024, 1, 1, 10, 0);
        assert_eq!(days_inactive(last, at(2024, 1, 4, 9, 59)), 2);
        assert_eq!(days_inactive(last, at(2024, 1, 4, 10, 0)), 3);
    }

    #[test]
    fn milestones() {
        let milestones: Vec<_> = (1..=100).filter(|d| is_milestone(*d)).collect();
        assert_eq!(milestones, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }
}
