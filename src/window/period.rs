use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::date_util::{add_months, last_day_of_month, quarter_of_month};
use crate::error::{Error, Result};

static RE_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// A calendar month, the storage resolution of every raw series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Build a month, rejecting month numbers outside 1-12.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::PeriodParse(format!("month out of range: {year}-{month}")));
        }
        Ok(Self { year, month })
    }

    /// The month containing `d`.
    pub fn of(d: NaiveDate) -> Self {
        Self {
            year: d.year(),
            month: d.month(),
        }
    }

    /// Parse a `YYYY-MM` key.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let caps = RE_MONTH
            .captures(s)
            .ok_or_else(|| Error::PeriodParse(format!("expected YYYY-MM, got {s}")))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))?;
        let month: u32 = caps[2]
            .parse()
            .map_err(|_| Error::PeriodParse(format!("invalid month: {s}")))?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Quarter number (1-4) this month belongs to.
    pub fn quarter(&self) -> u8 {
        quarter_of_month(self.month)
    }

    /// Shift by `delta` months (negative goes back in time).
    pub fn add(&self, delta: i32) -> Self {
        let (year, month) = add_months(self.year, self.month, delta);
        Self { year, month }
    }

    pub fn next(&self) -> Self {
        self.add(1)
    }

    pub fn previous(&self) -> Self {
        self.add(-1)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        last_day_of_month(self.year, self.month)
    }

    /// Canonical `YYYY-MM` key used by storage and by month-granularity output.
    pub fn to_key(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }

    /// `count` consecutive months ending at (and including) `self`, ascending.
    pub fn trailing(&self, count: u32) -> Vec<Month> {
        (0..count as i32).rev().map(|back| self.add(-back)).collect()
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key())
    }
}

/// An output bucket label: a single month or a calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Month(Month),
    Quarter(i32, u8),
}

impl Period {
    /// The quarter label containing `month`.
    pub fn quarter_of(month: Month) -> Self {
        Period::Quarter(month.year(), month.quarter())
    }

    /// Convert to a canonical key string (`YYYY-MM` or `YYYY-Qn`).
    pub fn to_key(&self) -> String {
        match self {
            Period::Month(m) => m.to_key(),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key())
    }
}
