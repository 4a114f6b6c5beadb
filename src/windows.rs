//! Calendar-month extraction windows.

use chrono::{Datelike, Months, NaiveDate};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWindow {
    anchors: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("month arithmetic overflowed after {0}")]
    Overflow(NaiveDate),
}

impl ExtractionWindow {
    pub fn anchors(&self) -> &[NaiveDate] {
        &self.anchors
    }

    pub fn start(&self) -> NaiveDate {
        self.anchors[0]
    }

    pub fn end(&self) -> NaiveDate {
        self.anchors[self.anchors.len() - 1]
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start() <= date && date <= self.end()
    }

    pub fn month_keys(&self) -> Vec<MonthKey> {
        let mut keys: Vec<MonthKey> = Vec::with_capacity(self.anchors.len());
        for anchor in &self.anchors {
            let key = MonthKey::of(*anchor);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

pub fn generate_monthly_dates(
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ExtractionWindow, WindowError> {
    if start > end {
        return Err(WindowError::InvalidRange { start, end });
    }

    if MonthKey::of(start) == MonthKey::of(end) {
        return Ok(ExtractionWindow {
            anchors: vec![start, end],
        });
    }

    // Each anchor steps from the previous one, so a clamped day carries forward.
    let mut anchors = Vec::new();
    let mut current = start;
    while current <= end {
        anchors.push(current);
        current = current
            .checked_add_months(Months::new(1))
            .ok_or(WindowError::Overflow(current))?;
    }

    // Replace the last anchor only when it shares end's month; otherwise that
    // anchor's month would never be queried.
    match anchors.last_mut() {
        Some(last) if MonthKey::of(*last) == MonthKey::of(end) => *last = end,
        Some(last) if *last != end => anchors.push(end),
        _ => {}
    }

    Ok(ExtractionWindow { anchors })
}
