//! Time-step structure derived from raw timestamp columns.
//!
//! Timestamps are naive local (fixed-offset) times; nothing here converts
//! time zones.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{FluxError, Result};
use crate::input::DataTable;

/// Shortest accepted time step (5 minutes).
pub const MIN_STEP_SECONDS: i64 = 300;
/// Longest accepted time step (1 hour).
pub const MAX_STEP_SECONDS: i64 = 3600;
/// Fewest rows a record may hold.
pub const MIN_STEPS: usize = 12;
/// Upper bound (exclusive) on rows.
pub const MAX_STEPS: usize = 1_000_000_000;

const SECONDS_PER_DAY: i64 = 86_400;

/// Names of the start/end timestamp columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeColumns {
    pub start: String,
    pub end: String,
}

impl Default for TimeColumns {
    fn default() -> Self {
        Self {
            start: "TIMESTAMP_START".to_string(),
            end: "TIMESTAMP_END".to_string(),
        }
    }
}

impl TimeColumns {
    pub fn contains(&self, name: &str) -> bool {
        self.start == name || self.end == name
    }
}

/// Regular time axis of one input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub step_seconds: u32,
    pub start_instant: NaiveDateTime,
    pub step_count: usize,
    /// Day count of every calendar year the record touches.
    pub days_per_year: BTreeMap<i32, u32>,
    /// Years fully covered by the record.
    pub whole_years: BTreeSet<i32>,
    /// Row range of every calendar year touched, partial years included.
    pub year_rows: BTreeMap<i32, Range<usize>>,
}

/// Parse a `YYYYMMDDHHMM` (or `YYYYMMDDHHMMSS`) timestamp.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    // Spreadsheet exports sometimes render the stamp as a float.
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    if !(raw.len() == 12 || raw.len() == 14) || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: Range<usize>| raw[range].parse::<u32>().ok();
    let year = raw[0..4].parse::<i32>().ok()?;
    let second = if raw.len() == 14 { field(12..14)? } else { 0 };

    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?.and_hms_opt(
        field(8..10)?,
        field(10..12)?,
        second,
    )
}

/// Read and parse a timestamp column.
pub fn read_timestamps(table: &DataTable, index: usize) -> Result<Vec<NaiveDateTime>> {
    table
        .column_values(index)
        .enumerate()
        .map(|(row, raw)| {
            parse_timestamp(raw).ok_or_else(|| {
                FluxError::Timing(format!(
                    "unreadable timestamp '{}' in column '{}' at row {}",
                    raw, table.headers[index], row + 1
                ))
            })
        })
        .collect()
}

fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

fn jan_first(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

impl TimeGrid {
    /// Derive the grid from per-row start and end stamps.
    ///
    /// Fails with [`FluxError::Timing`] when the first step is outside
    /// [300, 3600] s or doesn't divide a day, when the row count is out of
    /// bounds, or when the stamps drift from a regular axis.
    pub fn derive(starts: &[NaiveDateTime], ends: &[NaiveDateTime]) -> Result<Self> {
        let (Some(&first_start), Some(&first_end), Some(&last_end)) =
            (starts.first(), ends.first(), ends.last())
        else {
            return Err(FluxError::Timing("record has no timestamps".to_string()));
        };
        if starts.len() != ends.len() {
            return Err(FluxError::Timing(format!(
                "{} start stamps but {} end stamps",
                starts.len(),
                ends.len()
            )));
        }

        let step = (first_end - first_start).num_seconds();
        if !(MIN_STEP_SECONDS..=MAX_STEP_SECONDS).contains(&step) {
            return Err(FluxError::Timing(format!(
                "time step of {} s is outside [{}, {}] s",
                step, MIN_STEP_SECONDS, MAX_STEP_SECONDS
            )));
        }
        if SECONDS_PER_DAY % step != 0 {
            return Err(FluxError::Timing(format!(
                "time step of {} s does not divide a day evenly",
                step
            )));
        }

        let step_count = starts.len();
        if !(MIN_STEPS..MAX_STEPS).contains(&step_count) {
            return Err(FluxError::Timing(format!(
                "{} time steps is outside [{}, {})",
                step_count, MIN_STEPS, MAX_STEPS
            )));
        }

        let step_duration = Duration::seconds(step);
        let mut expected = first_start;
        for (row, &actual) in starts.iter().enumerate() {
            if actual != expected {
                return Err(FluxError::Timing(format!(
                    "irregular time axis at row {}: expected {}, found {}",
                    row + 1,
                    expected,
                    actual
                )));
            }
            expected += step_duration;
        }

        // `expected` is now start + step_count * step
        if last_end != expected {
            return Err(FluxError::Timing(format!(
                "record span drifts: {} steps of {} s end at {}, file ends at {}",
                step_count, step, expected, last_end
            )));
        }

        Ok(Self::build(first_start, step as u32, step_count))
    }

    /// Grid for a known start, step and length. No validation.
    pub fn build(start_instant: NaiveDateTime, step_seconds: u32, step_count: usize) -> Self {
        let step = i64::from(step_seconds);
        let last_start = start_instant + Duration::seconds(step * (step_count as i64 - 1));

        let mut days_per_year = BTreeMap::new();
        let mut whole_years = BTreeSet::new();
        let mut year_rows = BTreeMap::new();

        for year in start_instant.year()..=last_start.year() {
            let days = days_in_year(year);
            days_per_year.insert(year, days);

            let from = ((jan_first(year) - start_instant).num_seconds().max(0) + step - 1) / step;
            let to = ((jan_first(year + 1) - start_instant).num_seconds() + step - 1) / step;
            let rows = (from as usize).min(step_count)..(to as usize).min(step_count);

            let steps_in_year = i64::from(days) * SECONDS_PER_DAY / step;
            let starts_on_jan_first =
                start_instant + Duration::seconds(step * from) == jan_first(year);
            if starts_on_jan_first && rows.len() as i64 == steps_in_year {
                whole_years.insert(year);
            }
            year_rows.insert(year, rows);
        }

        Self {
            step_seconds,
            start_instant,
            step_count,
            days_per_year,
            whole_years,
            year_rows,
        }
    }

    /// Total span covered in seconds.
    pub fn span_seconds(&self) -> i64 {
        self.step_count as i64 * i64::from(self.step_seconds)
    }

    /// End of the last step.
    pub fn end_instant(&self) -> NaiveDateTime {
        self.start_instant + Duration::seconds(self.span_seconds())
    }

    /// Start of step `index`.
    pub fn instant(&self, index: usize) -> NaiveDateTime {
        self.start_instant + Duration::seconds(index as i64 * i64::from(self.step_seconds))
    }

    /// Offsets of every step start from the first, in seconds.
    pub fn time_values(&self) -> Vec<f64> {
        (0..self.step_count)
            .map(|i| (i as u64 * u64::from(self.step_seconds)) as f64)
            .collect()
    }

    /// CF time units string for [`time_values`](Self::time_values).
    pub fn time_units(&self) -> String {
        format!("seconds since {}", self.start_instant.format("%Y-%m-%d %H:%M:%S"))
    }

    /// Row range of a whole year, or `None` if the year is partial or absent.
    pub fn whole_year_rows(&self, year: i32) -> Option<Range<usize>> {
        if self.whole_years.contains(&year) {
            self.year_rows.get(&year).cloned()
        } else {
            None
        }
    }

    /// Time step as a compact label, e.g. `30min`.
    pub fn step_label(&self) -> String {
        if self.step_seconds % 60 == 0 {
            format!("{}min", self.step_seconds / 60)
        } else {
            format!("{}s", self.step_seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn axis(start: &str, step: i64, n: usize) -> (Vec<NaiveDateTime>, Vec<NaiveDateTime>) {
        let s = stamp(start);
        let starts: Vec<_> = (0..n as i64).map(|i| s + Duration::seconds(i * step)).collect();
        let ends = starts.iter().map(|t| *t + Duration::seconds(step)).collect();
        (starts, ends)
    }

    #[test]
    fn test_parse_timestamp() {
        let t = stamp("200101010030");
        assert_eq!(t.format("%Y-%m-%d %H:%M").to_string(), "2001-01-01 00:30");
        assert_eq!(stamp("20010101003015").format("%S").to_string(), "15");
        assert_eq!(stamp("200101010030.0"), t);
        assert!(parse_timestamp("2001-01-01").is_none());
        assert!(parse_timestamp("200113010000").is_none());
        assert!(parse_timestamp("-9999").is_none());
    }

    #[test]
    fn test_half_hourly_two_years() {
        let (starts, ends) = axis("200101010000", 1800, 35040);
        let grid = TimeGrid::derive(&starts, &ends).unwrap();

        assert_eq!(grid.step_seconds, 1800);
        assert_eq!(grid.step_count, 35040);
        assert_eq!(grid.whole_years.iter().copied().collect::<Vec<_>>(), vec![2001, 2002]);
        assert_eq!(grid.days_per_year[&2001], 365);
        assert_eq!(grid.year_rows[&2002], 17520..35040);
        assert_eq!(grid.span_seconds(), 35040 * 1800);
        assert_eq!(grid.end_instant(), stamp("200301010000"));
        assert_eq!(grid.time_units(), "seconds since 2001-01-01 00:00:00");
        assert_eq!(grid.step_label(), "30min");
    }

    #[test]
    fn test_leap_year_counted() {
        let (starts, ends) = axis("200401010000", 3600, 366 * 24);
        let grid = TimeGrid::derive(&starts, &ends).unwrap();
        assert_eq!(grid.days_per_year[&2004], 366);
        assert!(grid.whole_years.contains(&2004));
    }

    #[test]
    fn test_partial_years_tracked_not_whole() {
        // Mid-2001 to mid-2003
        let (starts, ends) = axis("200107010000", 3600, 2 * 365 * 24);
        let grid = TimeGrid::derive(&starts, &ends).unwrap();
        assert_eq!(grid.whole_years.iter().copied().collect::<Vec<_>>(), vec![2002]);
        assert!(grid.year_rows.contains_key(&2001));
        assert!(grid.year_rows.contains_key(&2003));
        assert!(grid.whole_year_rows(2001).is_none());
        let rows_2001 = grid.year_rows[&2001].clone();
        assert_eq!(rows_2001.start, 0);
        assert_eq!(rows_2001.end, grid.year_rows[&2002].start);
    }

    #[test]
    fn test_step_out_of_bounds() {
        let (starts, ends) = axis("200101010000", 60, 100);
        assert!(matches!(TimeGrid::derive(&starts, &ends), Err(FluxError::Timing(_))));

        let (starts, ends) = axis("200101010000", 7200, 100);
        assert!(matches!(TimeGrid::derive(&starts, &ends), Err(FluxError::Timing(_))));
    }

    #[test]
    fn test_step_must_divide_day() {
        let (starts, ends) = axis("200101010000", 420, 100);
        let err = TimeGrid::derive(&starts, &ends).unwrap_err();
        assert!(err.to_string().contains("divide"));
    }

    #[test]
    fn test_too_few_steps() {
        let (starts, ends) = axis("200101010000", 1800, 11);
        assert!(matches!(TimeGrid::derive(&starts, &ends), Err(FluxError::Timing(_))));
        let (starts, ends) = axis("200101010000", 1800, 12);
        assert!(TimeGrid::derive(&starts, &ends).is_ok());
    }

    #[test]
    fn test_irregular_axis_rejected() {
        let (mut starts, ends) = axis("200101010000", 1800, 48);
        starts[10] += Duration::seconds(60);
        let err = TimeGrid::derive(&starts, &ends).unwrap_err();
        assert!(err.to_string().contains("row 11"));
    }

    #[test]
    fn test_drifting_end_rejected() {
        let (starts, mut ends) = axis("200101010000", 1800, 48);
        *ends.last_mut().unwrap() += Duration::seconds(1800);
        let err = TimeGrid::derive(&starts, &ends).unwrap_err();
        assert!(err.to_string().contains("drifts"));
    }

    #[test]
    fn test_time_values() {
        let grid = TimeGrid::build(stamp("200101010000"), 1800, 4);
        assert_eq!(grid.time_values(), vec![0.0, 1800.0, 3600.0, 5400.0]);
        assert_eq!(grid.instant(2), stamp("200101010100"));
    }
}
