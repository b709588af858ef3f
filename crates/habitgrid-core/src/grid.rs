//! Week-aligned calendar grid for a habit's completion history.
//!
//! Columns are weeks, rows are weekdays (Monday first). The first column
//! starts on the Monday on or before the requested start date, so a partial
//! leading week still has all seven cells; cells outside the requested
//! range always read as not done.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, Duration, NaiveDate};
use tracing::{debug, warn};

use crate::error::{GridError, Result};

pub const DAYS_PER_WEEK: usize = 7;

/// Sparse date -> status mapping for one habit. Any status above zero is
/// "done"; absent dates are "not done".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMap {
    entries: BTreeMap<NaiveDate, i64>,
}

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `status` for `date`, replacing (and returning) any previous value.
    pub fn insert(&mut self, date: NaiveDate, status: i64) -> Option<i64> {
        self.entries.insert(date, status)
    }

    /// Stores a raw textual status using [`coerce_status`].
    pub fn insert_raw(&mut self, date: NaiveDate, raw: &str) -> Option<i64> {
        self.insert(date, coerce_status(raw))
    }

    /// Builds a map from `YYYY-MM-DD` keys. Keys that do not parse are
    /// skipped.
    pub fn from_iso_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut map = Self::new();
        for (key, status) in entries {
            let key = key.as_ref();
            match NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d") {
                Ok(date) => {
                    map.insert(date, status);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping status entry with malformed date");
                }
            }
        }
        map
    }

    pub fn get(&self, date: NaiveDate) -> Option<i64> {
        self.entries.get(&date).copied()
    }

    pub fn is_done(&self, date: NaiveDate) -> bool {
        self.get(date).is_some_and(|status| status > 0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
        self.entries.iter().map(|(date, status)| (*date, *status))
    }
}

impl FromIterator<(NaiveDate, i64)> for StatusMap {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, i64)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Permissive status coercion: positive numbers are done (1), everything
/// else, including text that is not a number, is not done (0).
pub fn coerce_status(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return value.max(0);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value > 0.0 => 1,
        _ => 0,
    }
}

/// Inclusive calendar range. `start <= end` is enforced on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(GridError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The window `[end - days, end]`, i.e. `days + 1` calendar days.
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self> {
        let start = end.checked_sub_days(Days::new(u64::from(days))).ok_or_else(|| {
            GridError::OutOfRange(format!("{days} days before {end} precedes the calendar"))
        })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// X-axis label for the column holding the first day of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthLabel {
    pub week: usize,
    pub year: i32,
    /// 1 = January ... 12 = December.
    pub month: u32,
}

/// A day-1 cell inside the requested range; drawn with a "1" overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayMarker {
    pub week: usize,
    pub row: usize,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub week: usize,
    pub row: usize,
    pub date: NaiveDate,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    range: DateRange,
    week_start: NaiveDate,
    columns: Vec<[u8; DAYS_PER_WEEK]>,
    month_labels: Vec<MonthLabel>,
    day_markers: Vec<DayMarker>,
}

impl Grid {
    pub fn start(&self) -> NaiveDate {
        self.range.start()
    }

    pub fn end(&self) -> NaiveDate {
        self.range.end()
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Monday of the first column.
    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }

    pub fn num_weeks(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> usize {
        DAYS_PER_WEEK
    }

    /// Sunday of the last column.
    pub fn last_date(&self) -> NaiveDate {
        offset(self.week_start, self.columns.len() * DAYS_PER_WEEK - 1)
    }

    pub fn date_at(&self, week: usize, row: usize) -> Option<NaiveDate> {
        if week >= self.columns.len() || row >= DAYS_PER_WEEK {
            return None;
        }
        Some(offset(self.week_start, week * DAYS_PER_WEEK + row))
    }

    pub fn value(&self, week: usize, row: usize) -> Option<u8> {
        self.columns.get(week).and_then(|column| column.get(row)).copied()
    }

    pub fn is_done(&self, week: usize, row: usize) -> bool {
        self.value(week, row) == Some(1)
    }

    /// Position of `date` in the grid, if the grid covers it.
    pub fn position_of(&self, date: NaiveDate) -> Option<(usize, usize)> {
        let days = usize::try_from((date - self.week_start).num_days()).ok()?;
        let (week, row) = (days / DAYS_PER_WEEK, days % DAYS_PER_WEEK);
        (week < self.columns.len()).then_some((week, row))
    }

    pub fn month_labels(&self) -> &[MonthLabel] {
        &self.month_labels
    }

    pub fn day_markers(&self) -> &[DayMarker] {
        &self.day_markers
    }

    pub fn is_month_start(date: NaiveDate) -> bool {
        date.day() == 1
    }

    /// All cells, week by week, Monday to Sunday within a week.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.columns.iter().enumerate().flat_map(move |(week, column)| {
            column.iter().enumerate().map(move |(row, value)| Cell {
                week,
                row,
                date: offset(self.week_start, week * DAYS_PER_WEEK + row),
                done: *value == 1,
            })
        })
    }

    /// Number of done cells; out-of-range cells never count.
    pub fn done_count(&self) -> usize {
        self.columns
            .iter()
            .flat_map(|column| column.iter())
            .filter(|value| **value == 1)
            .count()
    }
}

/// Lays out `status_map` over `[start, end]`.
#[tracing::instrument(skip(status_map), fields(entries = status_map.len()))]
pub fn build(status_map: &StatusMap, start: NaiveDate, end: NaiveDate) -> Result<Grid> {
    let range = DateRange::new(start, end)?;

    let lead = i64::from(start.weekday().num_days_from_monday());
    let week_start = start
        .checked_sub_signed(Duration::days(lead))
        .ok_or_else(|| out_of_range(start, end))?;
    let total_days = (end - week_start).num_days() + 1;
    let num_weeks =
        usize::try_from((total_days + 6) / 7).map_err(|_| out_of_range(start, end))?;

    // The last column ends on a Sunday that must itself be a valid date.
    let trailing =
        i64::try_from(num_weeks * DAYS_PER_WEEK - 1).map_err(|_| out_of_range(start, end))?;
    week_start
        .checked_add_signed(Duration::days(trailing))
        .ok_or_else(|| out_of_range(start, end))?;

    let mut columns = Vec::with_capacity(num_weeks);
    let mut month_labels = Vec::new();
    let mut day_markers = Vec::new();

    let first_of_start_month = start.with_day(1).unwrap_or(start);
    if first_of_start_month < week_start {
        month_labels.push(MonthLabel {
            week: 0,
            year: start.year(),
            month: start.month(),
        });
    }

    for week in 0..num_weeks {
        let mut column = [0_u8; DAYS_PER_WEEK];
        for (row, value) in column.iter_mut().enumerate() {
            let date = offset(week_start, week * DAYS_PER_WEEK + row);
            let in_range = range.contains(date);

            if in_range && status_map.is_done(date) {
                *value = 1;
            }

            if Grid::is_month_start(date) {
                month_labels.push(MonthLabel {
                    week,
                    year: date.year(),
                    month: date.month(),
                });
                if in_range {
                    day_markers.push(DayMarker { week, row, date });
                }
            }
        }
        columns.push(column);
    }

    debug!(
        %week_start,
        num_weeks,
        labels = month_labels.len(),
        markers = day_markers.len(),
        "built habit grid"
    );

    Ok(Grid {
        range,
        week_start,
        columns,
        month_labels,
        day_markers,
    })
}

fn out_of_range(start: NaiveDate, end: NaiveDate) -> GridError {
    GridError::OutOfRange(format!("weeks around {start}..{end} leave the calendar"))
}

fn offset(date: NaiveDate, days: usize) -> NaiveDate {
    // Bounds were validated in `build`, so the fallback is never taken.
    u64::try_from(days)
        .ok()
        .and_then(|days| date.checked_add_days(Days::new(days)))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn each_range() -> impl Iterator<Item = (NaiveDate, NaiveDate)> {
        let anchor = d(2023, 12, 18);
        (0..21_i64).flat_map(move |shift| {
            let start = anchor + Duration::days(shift);
            [0_i64, 1, 5, 6, 7, 13, 30, 45, 80]
                .into_iter()
                .map(move |len| (start, start + Duration::days(len)))
        })
    }

    fn noisy_map(start: NaiveDate, end: NaiveDate) -> StatusMap {
        let mut map = StatusMap::new();
        let mut day = start - Duration::days(10);
        let mut i = 0_i64;
        while day <= end + Duration::days(10) {
            map.insert(day, if i % 3 == 0 { 1 } else { i % 2 - 1 });
            day += Duration::days(1);
            i += 1;
        }
        map
    }

    #[test]
    fn full_week_starting_monday_is_one_column() {
        let grid = build(&StatusMap::new(), d(2024, 1, 1), d(2024, 1, 7)).expect("grid");

        assert_eq!(grid.rows(), 7);
        assert_eq!(grid.num_weeks(), 1);
        assert_eq!(grid.done_count(), 0);
        assert_eq!(
            grid.month_labels(),
            &[MonthLabel {
                week: 0,
                year: 2024,
                month: 1
            }]
        );
        assert_eq!(
            grid.day_markers(),
            &[DayMarker {
                week: 0,
                row: 0,
                date: d(2024, 1, 1)
            }]
        );
    }

    #[test]
    fn leap_day_window_labels_both_months() {
        let map = StatusMap::from_iso_entries([("2024-03-01", 1)]);
        let grid = build(&map, d(2024, 2, 28), d(2024, 3, 2)).expect("grid");

        assert_eq!(grid.week_start(), d(2024, 2, 26));
        assert_eq!(grid.position_of(d(2024, 3, 1)), Some((0, 4)));
        assert!(grid.is_done(0, 4));
        assert_eq!(grid.position_of(d(2024, 2, 29)), Some((0, 3)));
        assert!(!grid.is_done(0, 3));
        assert_eq!(grid.done_count(), 1);

        let months: Vec<u32> = grid.month_labels().iter().map(|l| l.month).collect();
        assert_eq!(months, vec![2, 3]);
    }

    #[test]
    fn single_day_has_one_true_cell_on_its_weekday() {
        let day = d(2024, 5, 16); // Thursday
        let mut map = StatusMap::new();
        map.insert(day, 1);

        let grid = build(&map, day, day).expect("grid");
        assert_eq!(grid.num_weeks(), 1);
        assert_eq!(grid.done_count(), 1);
        assert!(grid.is_done(0, 3));
    }

    #[test]
    fn entries_outside_range_do_not_leak() {
        let mut map = StatusMap::new();
        map.insert(d(2024, 4, 1), 1); // Monday before the range, same week
        map.insert(d(2024, 4, 7), 1); // Sunday after the range, same week

        let grid = build(&map, d(2024, 4, 3), d(2024, 4, 5)).expect("grid");
        assert_eq!(grid.num_weeks(), 1);
        assert_eq!(grid.done_count(), 0);
        assert_eq!(grid.date_at(0, 0), Some(d(2024, 4, 1)));
        assert_eq!(grid.date_at(0, 6), Some(d(2024, 4, 7)));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = build(&StatusMap::new(), d(2024, 3, 2), d(2024, 3, 1)).expect_err("must fail");
        assert_eq!(
            err,
            GridError::InvalidRange {
                start: d(2024, 3, 2),
                end: d(2024, 3, 1)
            }
        );
    }

    #[test]
    fn year_boundary_labels_are_adjacent() {
        let grid = build(&StatusMap::new(), d(2023, 11, 20), d(2024, 1, 20)).expect("grid");
        let labels: Vec<(i32, u32)> = grid
            .month_labels()
            .iter()
            .map(|l| (l.year, l.month))
            .collect();
        assert_eq!(labels, vec![(2023, 11), (2023, 12), (2024, 1)]);
    }

    #[test]
    fn grid_shape_and_dates_are_consistent() {
        for (start, end) in each_range() {
            let grid = build(&StatusMap::new(), start, end).expect("grid");
            let last = grid.week_start() + Duration::days(7 * grid.num_weeks() as i64 - 1);

            assert_eq!(grid.rows(), 7);
            assert_eq!(grid.week_start().weekday(), chrono::Weekday::Mon);
            assert!(grid.week_start() <= start);
            assert_eq!(grid.last_date(), last);
            assert!(last >= end, "{start}..{end} not covered");
            assert!(last - end < Duration::days(7), "{start}..{end} has a spare week");

            for cell in grid.cells() {
                assert!(cell.date >= grid.week_start() && cell.date <= last);
                assert_eq!(cell.date.weekday().num_days_from_monday() as usize, cell.row);
                if cell.week > 0 {
                    let left = grid.date_at(cell.week - 1, cell.row).expect("left cell");
                    assert_eq!(cell.date - left, Duration::days(7));
                }
            }
        }
    }

    #[test]
    fn values_follow_map_and_range() {
        for (start, end) in each_range() {
            let map = noisy_map(start, end);
            let grid = build(&map, start, end).expect("grid");

            for cell in grid.cells() {
                let expected = start <= cell.date && cell.date <= end && map.is_done(cell.date);
                assert_eq!(cell.done, expected, "cell {} in {start}..{end}", cell.date);
            }
        }
    }

    #[test]
    fn build_is_deterministic() {
        let (start, end) = (d(2024, 1, 10), d(2024, 6, 30));
        let map = noisy_map(start, end);
        assert_eq!(
            build(&map, start, end).expect("first"),
            build(&map, start, end).expect("second")
        );
    }

    #[test]
    fn every_first_of_month_in_grid_gets_one_label() {
        for (start, end) in each_range() {
            let grid = build(&StatusMap::new(), start, end).expect("grid");

            for cell in grid.cells().filter(|c| Grid::is_month_start(c.date)) {
                let matching: Vec<_> = grid
                    .month_labels()
                    .iter()
                    .filter(|l| l.year == cell.date.year() && l.month == cell.date.month())
                    .collect();
                assert_eq!(matching.len(), 1, "{} in {start}..{end}", cell.date);
                assert_eq!(matching[0].week, cell.week);

                let marked = grid.day_markers().iter().any(|m| m.date == cell.date);
                assert_eq!(marked, start <= cell.date && cell.date <= end);
            }
        }
    }

    #[test]
    fn opening_month_is_labelled_at_first_column() {
        let grid = build(&StatusMap::new(), d(2024, 7, 17), d(2024, 7, 28)).expect("grid");
        assert_eq!(
            grid.month_labels(),
            &[MonthLabel {
                week: 0,
                year: 2024,
                month: 7
            }]
        );
        assert!(grid.day_markers().is_empty());
    }

    #[test]
    fn trailing_window_spans_days_plus_one() {
        let range = DateRange::trailing(d(2024, 12, 31), 365).expect("range");
        assert_eq!(range.start(), d(2024, 1, 1));
        assert!(range.contains(d(2024, 2, 29)));
    }

    #[test]
    fn trailing_window_past_calendar_start_is_out_of_range() {
        let err = DateRange::trailing(d(2026, 10, 16), 200_000_000).expect_err("too long");
        assert!(matches!(err, GridError::OutOfRange(_)));
        assert!(err.to_string().contains("200000000 days before 2026-10-16"));
    }

    #[test]
    fn calendar_edges_never_report_a_reversed_range() {
        for date in [NaiveDate::MIN, NaiveDate::MAX] {
            match build(&StatusMap::new(), date, date) {
                Ok(grid) => assert_eq!(grid.num_weeks(), 1),
                Err(err) => assert!(matches!(err, GridError::OutOfRange(_)), "{err}"),
            }
        }
    }

    #[test]
    fn status_coercion_is_permissive() {
        assert_eq!(coerce_status("1"), 1);
        assert_eq!(coerce_status(" 3 "), 3);
        assert_eq!(coerce_status("0.5"), 1);
        assert_eq!(coerce_status("-2"), 0);
        assert_eq!(coerce_status("done"), 0);
        assert_eq!(coerce_status(""), 0);

        let mut map = StatusMap::new();
        map.insert_raw(d(2024, 1, 2), "yes");
        map.insert(d(2024, 1, 3), -1);
        assert!(!map.is_done(d(2024, 1, 2)));
        assert!(!map.is_done(d(2024, 1, 3)));
        assert!(!map.is_done(d(2024, 1, 4)));
    }

    #[test]
    fn malformed_iso_keys_are_skipped() {
        let map = StatusMap::from_iso_entries([("2024-01-05", 1), ("05/01/2024", 1), ("", 1)]);
        assert_eq!(map.len(), 1);
        assert!(map.is_done(d(2024, 1, 5)));
    }
}
