// 📅 Recurrence Generator - which occurrences are missing "as of today"
//
// Pure and stateless. Occurrence k of a rule is `start + k steps` (k >= 1,
// the start date itself is the template). Computing every date from the start
// instead of stepping from the previous one keeps monthly rules on their day
// of month (Jan 31 → Feb 28 → Mar 31) and makes the result depend only on
// (rule, checkpoint, today):
//
//   missing = { start + k·step | k >= 1, checkpoint < date <= min(today, end),
//               k <= occurrences }
//
// Calling it twice with the same checkpoint yields the same list; calling it
// with the checkpoint moved to the last returned date yields nothing.

use chrono::{Datelike, Days, Months, NaiveDate};

use crate::entities::{Cadence, Recurrence, RecurrenceEnd};

impl Cadence {
    /// Date of the k-th occurrence after `start`. None when it would fall
    /// outside the supported calendar.
    pub fn nth_after(&self, start: NaiveDate, k: u32) -> Option<NaiveDate> {
        match self {
            Cadence::Daily => start.checked_add_days(Days::new(u64::from(k))),
            Cadence::Weekly => start.checked_add_days(Days::new(7 * u64::from(k))),
            Cadence::Monthly => start.checked_add_months(Months::new(k)),
            Cadence::EveryDays(days) => {
                start.checked_add_days(Days::new(u64::from(*days) * u64::from(k)))
            }
        }
    }

    /// Step length in days for fixed-length cadences
    fn step_days(&self) -> Option<i64> {
        match self {
            Cadence::Daily => Some(1),
            Cadence::Weekly => Some(7),
            Cadence::Monthly => None,
            Cadence::EveryDays(days) => Some(i64::from(*days)),
        }
    }

    /// Lower bound for the index of the last occurrence on or before `date`.
    /// Only used to skip ahead; callers still walk forward from it.
    fn index_floor(&self, start: NaiveDate, date: NaiveDate) -> u32 {
        if date <= start {
            return 0;
        }
        let steps = match self.step_days() {
            Some(step) => (date - start).num_days() / step,
            None => {
                let months = (date.year() - start.year()) * 12 + date.month() as i32
                    - start.month() as i32;
                i64::from(months - 1)
            }
        };
        u32::try_from(steps.max(0)).unwrap_or(u32::MAX)
    }

    fn is_degenerate(&self) -> bool {
        matches!(self, Cadence::EveryDays(0))
    }
}

/// Number of occurrences already generated for the rule: grid dates after the
/// start date and up to the checkpoint.
pub fn occurrences_passed(rule: &Recurrence) -> u32 {
    let Some(last) = rule.last_generated else {
        return 0;
    };
    if rule.cadence.is_degenerate() {
        return 0;
    }

    let mut k = rule.cadence.index_floor(rule.start_date, last).max(1);
    while let Some(date) = rule.cadence.nth_after(rule.start_date, k) {
        if date > last {
            break;
        }
        k += 1;
    }
    k - 1
}

/// Ordered, gap-free list of occurrence dates strictly after the rule's
/// checkpoint and up to and including `today` (or the end date, if earlier).
pub fn missing_dates(rule: &Recurrence, today: NaiveDate) -> Vec<NaiveDate> {
    let mut result = Vec::new();

    if rule.cadence.is_degenerate() {
        tracing::warn!("recurrence with a zero day interval never generates occurrences");
        return result;
    }

    let mut limit = today;
    if let RecurrenceEnd::OnDate(end) = rule.end {
        if end < limit {
            tracing::debug!(%end, "end date before today, generating up to end date");
            limit = end;
        }
    }

    if rule.start_date > limit {
        tracing::debug!(start = %rule.start_date, "start date is in the future");
        return result;
    }

    let checkpoint = rule.checkpoint();
    if checkpoint >= limit {
        tracing::debug!(%checkpoint, "up to date with all occurrences");
        return result;
    }

    let budget = rule.end.occurrences();
    if budget == Some(0) {
        return result;
    }

    // first index past the checkpoint
    let mut k = rule.cadence.index_floor(rule.start_date, checkpoint).max(1);
    loop {
        match rule.cadence.nth_after(rule.start_date, k) {
            Some(date) if date <= checkpoint => k += 1,
            _ => break,
        }
    }

    loop {
        if let Some(max) = budget {
            if k > max {
                tracing::debug!(occurrences = max, "occurrence budget exhausted");
                break;
            }
        }
        let Some(date) = rule.cadence.nth_after(rule.start_date, k) else {
            break;
        };
        if date > limit {
            break;
        }
        result.push(date);
        k += 1;
    }

    tracing::debug!(cadence = %rule.cadence.label(), count = result.len(), "missing occurrences computed");
    result
}
