//! Calendar dates used by every event in the game.
//!
//! Dates travel on the wire as `YYYY-MM-DD` strings with no timezone
//! component. Parsing is strict: the input must re-format to exactly the
//! same string, so `2025-1-2` or `02025-01-02` are rejected even though a
//! lenient parser would accept them.

use core::fmt;
use core::str::FromStr;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

/// The canonical wire format for an [`EventDate`].
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Error returned when a string is not a canonical `YYYY-MM-DD` date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date {input:?}: expected YYYY-MM-DD")]
pub struct DateParseError {
    /// The rejected input.
    pub input: String,
}

/// A calendar day in the game's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventDate(NaiveDate);

impl EventDate {
    /// Parse a canonical `YYYY-MM-DD` string.
    ///
    /// # Errors
    ///
    /// Returns [`DateParseError`] if the string is not a real calendar date
    /// in canonical form.
    pub fn parse(input: &str) -> Result<Self, DateParseError> {
        let reject = || DateParseError {
            input: input.to_owned(),
        };
        let date = NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|_err| reject())?;
        if date.format(DATE_FORMAT).to_string() != input {
            return Err(reject());
        }
        Ok(Self(date))
    }

    /// Build a date from its components.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Today's date in UTC.
    pub fn today_utc() -> Self {
        Self(Utc::now().date_naive())
    }

    /// The following calendar day, or `None` at the end of the representable range.
    pub fn next_day(self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// This date shifted forward by `days` calendar days.
    pub fn plus_days(self, days: u64) -> Option<Self> {
        self.0.checked_add_days(Days::new(days)).map(Self)
    }

    /// Return the inner [`NaiveDate`].
    pub const fn into_inner(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for EventDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for EventDate {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EventDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_dates() {
        let date = EventDate::parse("2025-02-10").unwrap();
        assert_eq!(date.to_string(), "2025-02-10");
    }

    #[test]
    fn rejects_non_canonical_dates() {
        assert!(EventDate::parse("2025-2-10").is_err());
        assert!(EventDate::parse("2025-02-30").is_err());
        assert!(EventDate::parse("2025-02-10T00:00:00Z").is_err());
        assert!(EventDate::parse("").is_err());
    }

    #[test]
    fn next_day_crosses_month_and_year() {
        let feb = EventDate::parse("2024-02-28").unwrap();
        assert_eq!(feb.next_day().unwrap().to_string(), "2024-02-29");
        let eve = EventDate::parse("2025-12-31").unwrap();
        assert_eq!(eve.next_day().unwrap().to_string(), "2026-01-01");
    }

    #[test]
    fn serde_uses_plain_string() {
        let date = EventDate::parse("2025-01-02").unwrap();
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"2025-01-02\"");
        let back: EventDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
        assert!(serde_json::from_str::<EventDate>("\"01/02/2025\"").is_err());
    }
}
