// 🔁 Recurrent Transaction - a template transaction plus a recurrence rule
//
// The rule is a tagged value: the cadence is either a named one or a custom
// "every N days", and the terminator is either nothing, an end date or an
// occurrence budget. Invalid combinations cannot be built.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Transaction;

// ============================================================================
// CADENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    /// Custom interval in days (must be at least 1)
    EveryDays(u32),
}

impl Cadence {
    /// Value of the `defaultType` column; custom intervals have none.
    pub fn default_type(&self) -> Option<i64> {
        match self {
            Cadence::Daily => Some(0),
            Cadence::Weekly => Some(1),
            Cadence::Monthly => Some(2),
            Cadence::EveryDays(_) => None,
        }
    }

    /// Value of the `numberDays` column; named cadences have none.
    pub fn number_of_days(&self) -> Option<u32> {
        match self {
            Cadence::EveryDays(days) => Some(*days),
            _ => None,
        }
    }

    /// Rebuild a cadence from the persisted columns. A named cadence wins
    /// over a day count.
    pub fn from_db(default_type: Option<i64>, number_days: Option<u32>) -> Option<Self> {
        match (default_type, number_days) {
            (Some(0), _) => Some(Cadence::Daily),
            (Some(1), _) => Some(Cadence::Weekly),
            (Some(2), _) => Some(Cadence::Monthly),
            (None, Some(days)) if days > 0 => Some(Cadence::EveryDays(days)),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Cadence::Daily => "Daily".into(),
            Cadence::Weekly => "Weekly".into(),
            Cadence::Monthly => "Monthly".into(),
            Cadence::EveryDays(days) => format!("Every {} days", days),
        }
    }
}

// ============================================================================
// TERMINATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceEnd {
    /// Runs indefinitely (bounded only by "today")
    Never,
    /// Last possible occurrence date (inclusive)
    OnDate(NaiveDate),
    /// Maximum number of generated occurrences
    AfterOccurrences(u32),
}

impl RecurrenceEnd {
    pub fn end_date(&self) -> Option<NaiveDate> {
        match self {
            RecurrenceEnd::OnDate(date) => Some(*date),
            _ => None,
        }
    }

    pub fn occurrences(&self) -> Option<u32> {
        match self {
            RecurrenceEnd::AfterOccurrences(count) => Some(*count),
            _ => None,
        }
    }
}

// ============================================================================
// RECURRENCE RULE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub cadence: Cadence,

    /// Baseline of the first occurrence (the template itself)
    pub start_date: NaiveDate,

    /// Checkpoint: date of the most recent materialized occurrence.
    /// None means nothing was generated yet.
    pub last_generated: Option<NaiveDate>,

    pub end: RecurrenceEnd,
}

impl Recurrence {
    pub fn new(cadence: Cadence, start_date: NaiveDate) -> Self {
        Recurrence {
            cadence,
            start_date,
            last_generated: None,
            end: RecurrenceEnd::Never,
        }
    }

    pub fn until(mut self, end_date: NaiveDate) -> Self {
        self.end = RecurrenceEnd::OnDate(end_date);
        self
    }

    pub fn times(mut self, occurrences: u32) -> Self {
        self.end = RecurrenceEnd::AfterOccurrences(occurrences);
        self
    }

    /// Resume point for generation
    pub fn checkpoint(&self) -> NaiveDate {
        self.last_generated.unwrap_or(self.start_date)
    }
}

// ============================================================================
// RECURRENT TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentTransaction {
    /// Identity of the rule, independent of the template transaction's id
    pub id: Option<Uuid>,

    /// Template cloned for every occurrence
    pub transaction: Transaction,

    pub recurrence: Recurrence,
}

impl RecurrentTransaction {
    pub fn new(transaction: Transaction, recurrence: Recurrence) -> Self {
        RecurrentTransaction {
            id: None,
            transaction,
            recurrence,
        }
    }

    pub fn was_stored(&self) -> bool {
        self.id.is_some()
    }
}
