use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::grid::StatusMap;
use crate::habit::{Habit, Mark, StatusEntry};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub habits_path: PathBuf,
    pub statuses_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let habits_path = data_dir.join("habits.data");
        let statuses_path = data_dir.join("statuses.data");

        if !habits_path.exists() {
            fs::write(&habits_path, "")?;
        }
        if !statuses_path.exists() {
            fs::write(&statuses_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            habits = %habits_path.display(),
            statuses = %statuses_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            habits_path,
            statuses_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_habits(&self) -> anyhow::Result<Vec<Habit>> {
        load_jsonl(&self.habits_path).context("failed to load habits.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_statuses(&self) -> anyhow::Result<Vec<StatusEntry>> {
        load_jsonl(&self.statuses_path).context("failed to load statuses.data")
    }

    #[tracing::instrument(skip(self, habits))]
    pub fn save_habits(&self, habits: &[Habit]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.habits_path, habits).context("failed to save habits.data")
    }

    #[tracing::instrument(skip(self, statuses))]
    pub fn save_statuses(&self, statuses: &[StatusEntry]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.statuses_path, statuses).context("failed to save statuses.data")
    }

    pub fn next_id(&self, habits: &[Habit]) -> u64 {
        habits.iter().map(|h| h.id).max().unwrap_or(0) + 1
    }

    #[tracing::instrument(skip(self, now))]
    pub fn add_habit(&self, name: &str, now: DateTime<Utc>) -> anyhow::Result<Habit> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("habit name cannot be empty"));
        }

        let mut habits = self.load_habits()?;
        let habit = Habit::new(name.to_string(), now, self.next_id(&habits));
        habits.push(habit.clone());
        habits.sort_by_key(|h| h.id);
        self.save_habits(&habits)?;

        debug!(id = habit.id, uuid = %habit.uuid, "habit added");
        Ok(habit)
    }

    #[tracing::instrument(skip(self, now), fields(uuid = %uuid))]
    pub fn rename_habit(
        &self,
        uuid: Uuid,
        name: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Habit> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("habit name cannot be empty"));
        }

        let mut habits = self.load_habits()?;
        let habit = habits
            .iter_mut()
            .find(|h| h.uuid == uuid)
            .ok_or_else(|| anyhow!("habit not found: {uuid}"))?;
        habit.name = name.to_string();
        habit.modified = now;
        let renamed = habit.clone();

        self.save_habits(&habits)?;
        Ok(renamed)
    }

    /// Removes the habit and every status recorded for it.
    #[tracing::instrument(skip(self), fields(uuid = %uuid))]
    pub fn delete_habit(&self, uuid: Uuid) -> anyhow::Result<Habit> {
        let mut habits = self.load_habits()?;
        let idx = habits
            .iter()
            .position(|h| h.uuid == uuid)
            .ok_or_else(|| anyhow!("habit not found: {uuid}"))?;
        let removed = habits.remove(idx);

        let statuses = self.load_statuses()?;
        let before = statuses.len();
        let kept: Vec<StatusEntry> = statuses.into_iter().filter(|s| s.habit != uuid).collect();

        self.save_habits(&habits)?;
        self.save_statuses(&kept)?;

        info!(
            id = removed.id,
            statuses_dropped = before - kept.len(),
            "deleted habit"
        );
        Ok(removed)
    }

    /// Records `mark` for `habit` on `date`, replacing any earlier mark for
    /// that day.
    #[tracing::instrument(skip(self, now), fields(habit = %habit))]
    pub fn set_mark(
        &self,
        habit: Uuid,
        date: NaiveDate,
        mark: Mark,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Mark>> {
        let mut statuses = self.load_statuses()?;
        let previous = statuses
            .iter()
            .position(|s| s.habit == habit && s.date == date)
            .map(|idx| statuses.remove(idx).mark);

        statuses.push(StatusEntry {
            habit,
            date,
            mark,
            recorded: now,
        });
        statuses.sort_by(|a, b| a.habit.cmp(&b.habit).then(a.date.cmp(&b.date)));
        self.save_statuses(&statuses)?;

        debug!(?previous, "mark recorded");
        Ok(previous)
    }

    pub fn mark_on(&self, habit: Uuid, date: NaiveDate) -> anyhow::Result<Option<Mark>> {
        Ok(self
            .load_statuses()?
            .into_iter()
            .rev()
            .find(|s| s.habit == habit && s.date == date)
            .map(|s| s.mark))
    }

    /// Every habit's mark for `date`, read with a single pass over the file.
    #[tracing::instrument(skip(self))]
    pub fn marks_on(&self, date: NaiveDate) -> anyhow::Result<HashMap<Uuid, Mark>> {
        let marks: HashMap<Uuid, Mark> = self
            .load_statuses()?
            .into_iter()
            .filter(|s| s.date == date)
            .map(|s| (s.habit, s.mark))
            .collect();
        debug!(marked = marks.len(), "loaded marks for day");
        Ok(marks)
    }

    /// Full history of one habit as grid input.
    #[tracing::instrument(skip(self), fields(habit = %habit))]
    pub fn status_map(&self, habit: Uuid) -> anyhow::Result<StatusMap> {
        let mut entries: Vec<StatusEntry> = self
            .load_statuses()?
            .into_iter()
            .filter(|s| s.habit == habit)
            .collect();
        entries.sort_by_key(|s| (s.date, s.recorded));

        let map: StatusMap = entries
            .into_iter()
            .map(|s| (s.date, s.mark.status()))
            .collect();
        debug!(entries = map.len(), "loaded status map");
        Ok(map)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn ids_are_sequential_and_names_trimmed() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let now = Utc::now();

        let first = store.add_habit("  Read  ", now).expect("add");
        let second = store.add_habit("Run", now).expect("add");
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(first.name, "Read");
        assert!(store.add_habit("   ", now).is_err());
    }

    #[test]
    fn later_mark_replaces_earlier_one() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let now = Utc::now();
        let habit = store.add_habit("Stretch", now).expect("add");
        let day = d(2024, 3, 1);

        assert_eq!(store.set_mark(habit.uuid, day, Mark::Done, now).expect("mark"), None);
        assert_eq!(
            store.set_mark(habit.uuid, day, Mark::Cancel, now).expect("mark"),
            Some(Mark::Done)
        );

        assert_eq!(store.load_statuses().expect("load").len(), 1);
        assert_eq!(store.mark_on(habit.uuid, day).expect("mark_on"), Some(Mark::Cancel));
        assert!(!store.status_map(habit.uuid).expect("map").is_done(day));
    }

    #[test]
    fn marks_for_one_day_cover_every_habit() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let now = Utc::now();
        let read = store.add_habit("Read", now).expect("add");
        let run = store.add_habit("Run", now).expect("add");
        let idle = store.add_habit("Idle", now).expect("add");
        let day = d(2024, 6, 1);
        store.set_mark(read.uuid, day, Mark::Done, now).expect("mark");
        store.set_mark(run.uuid, day, Mark::Cancel, now).expect("mark");
        store.set_mark(idle.uuid, d(2024, 6, 2), Mark::Done, now).expect("mark");

        let marks = store.marks_on(day).expect("marks");
        assert_eq!(marks.len(), 2);
        assert_eq!(marks.get(&read.uuid), Some(&Mark::Done));
        assert_eq!(marks.get(&run.uuid), Some(&Mark::Cancel));
        assert_eq!(marks.get(&idle.uuid), None);
    }

    #[test]
    fn delete_drops_history() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let now = Utc::now();
        let keep = store.add_habit("Keep", now).expect("add");
        let gone = store.add_habit("Gone", now).expect("add");
        store.set_mark(keep.uuid, d(2024, 1, 1), Mark::Done, now).expect("mark");
        store.set_mark(gone.uuid, d(2024, 1, 1), Mark::Done, now).expect("mark");

        store.delete_habit(gone.uuid).expect("delete");

        let habits = store.load_habits().expect("habits");
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].uuid, keep.uuid);
        let statuses = store.load_statuses().expect("statuses");
        assert!(statuses.iter().all(|s| s.habit == keep.uuid));
        assert!(store.delete_habit(gone.uuid).is_err());
    }

    #[test]
    fn statuses_serialize_as_plain_dates() {
        let entry = StatusEntry {
            habit: Uuid::nil(),
            date: d(2024, 2, 29),
            mark: Mark::Done,
            recorded: Utc::now(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("\"date\":\"2024-02-29\""));
        assert!(json.contains("\"mark\":\"done\""));
    }
}
