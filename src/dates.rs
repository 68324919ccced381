// 📅 Ledger Dates - the ledger's "DD Month YYYY HH:MM:SS" strings
// Everything that crosses the ledger API or the spreadsheet goes through here

use anyhow::{anyhow, bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Canonical format sent to the ledger and written to spreadsheets
pub const LEDGER_DATETIME_FORMAT: &str = "%d %B %Y %H:%M:%S";

const DATETIME_FALLBACKS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];
const DATE_FALLBACKS: &[&str] = &["%d %B %Y", "%d %b %Y", "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

/// A point in ledger time. Displays and serializes in ledger format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerDateTime(NaiveDateTime);

impl LedgerDateTime {
    pub fn new(inner: NaiveDateTime) -> Self {
        LedgerDateTime(inner)
    }

    /// Parse any of the date shapes operators and the ledger produce.
    ///
    /// Date-only inputs resolve to midnight.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            bail!("empty date");
        }

        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, LEDGER_DATETIME_FORMAT) {
            return Ok(LedgerDateTime(dt));
        }
        for fmt in DATETIME_FALLBACKS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return Ok(LedgerDateTime(dt));
            }
        }
        for fmt in DATE_FALLBACKS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
                return Ok(LedgerDateTime(midnight(date)));
            }
        }

        Err(anyhow!("Unable to parse date: {trimmed}"))
    }

    /// Build from the ledger's JSON array form: `[year, month, day(, h, m, s)]`.
    pub fn from_parts(parts: &[i64]) -> Result<Self> {
        if parts.len() < 3 {
            bail!("date array needs at least [year, month, day], got {parts:?}");
        }
        let field = |i: usize| parts.get(i).copied().unwrap_or(0);
        let date = NaiveDate::from_ymd_opt(field(0) as i32, field(1) as u32, field(2) as u32)
            .ok_or_else(|| anyhow!("invalid calendar date {parts:?}"))?;
        let dt = date
            .and_hms_opt(field(3) as u32, field(4) as u32, field(5) as u32)
            .ok_or_else(|| anyhow!("invalid time of day {parts:?}"))?;
        Ok(LedgerDateTime(dt))
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Ledger wire format, e.g. `15 February 2024 23:59:59`
    pub fn to_ledger_string(&self) -> String {
        self.0.format(LEDGER_DATETIME_FORMAT).to_string()
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

impl From<NaiveDateTime> for LedgerDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        LedgerDateTime(dt)
    }
}

impl fmt::Display for LedgerDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ledger_string())
    }
}

impl FromStr for LedgerDateTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        LedgerDateTime::parse(s)
    }
}

impl Serialize for LedgerDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_ledger_string())
    }
}

impl<'de> Deserialize<'de> for LedgerDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LedgerDateTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}
