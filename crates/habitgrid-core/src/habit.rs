use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub uuid: Uuid,

    pub id: u64,

    pub name: String,

    pub entry: DateTime<Utc>,

    pub modified: DateTime<Utc>,
}

impl Habit {
    pub fn new(name: String, now: DateTime<Utc>, id: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            name,
            entry: now,
            modified: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Done,
    Cancel,
}

impl Mark {
    /// Grid status for this mark: done is 1, cancel is 0.
    pub fn status(self) -> i64 {
        match self {
            Mark::Done => 1,
            Mark::Cancel => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Done => "done",
            Mark::Cancel => "cancel",
        }
    }
}

/// One day's outcome for one habit. The store keeps at most one entry per
/// `(habit, date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusEntry {
    pub habit: Uuid,
    pub date: NaiveDate,
    pub mark: Mark,
    pub recorded: DateTime<Utc>,
}
