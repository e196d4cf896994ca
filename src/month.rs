use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized month value '{0}', expected an ISO date or YYYY-MM")]
pub struct ParseError(pub String);

/// A calendar month, the time axis of every survey series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// Parses a full ISO date or date-time first, then falls back to `YYYY-MM`.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let trimmed = value.trim();
        parse_iso(trimmed)
            .or_else(|| parse_year_month(trimmed))
            .ok_or_else(|| ParseError(value.to_string()))
    }

    /// Short display label such as `Jan 2024`.
    pub fn label(&self) -> String {
        self.first_day().format("%b %Y").to_string()
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }
}

fn parse_iso(value: &str) -> Option<YearMonth> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })?;
    YearMonth::new(date.year(), date.month())
}

fn parse_year_month(value: &str) -> Option<YearMonth> {
    let (year, month) = value.split_once('-')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    YearMonth::new(year.parse().ok()?, month.parse().ok()?)
}

impl FromStr for YearMonth {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_year_month() {
        let month = YearMonth::parse("2024-03").unwrap();
        assert_eq!(month, YearMonth::new(2024, 3).unwrap());
        assert_eq!(month.to_string(), "2024-03");
        assert_eq!(YearMonth::parse("2024-3").unwrap().to_string(), "2024-03");
    }

    #[test]
    fn parses_iso_dates_and_timestamps() {
        assert_eq!(YearMonth::parse("2024-03-15").unwrap().to_string(), "2024-03");
        assert_eq!(
            YearMonth::parse("2023-11-01T00:00:00+00:00").unwrap().to_string(),
            "2023-11"
        );
        assert_eq!(
            YearMonth::parse("2023-11-30T08:15:00.250").unwrap().to_string(),
            "2023-11"
        );
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(YearMonth::parse("March 2024").is_err());
        assert!(YearMonth::parse("2024-13").is_err());
        assert!(YearMonth::parse("").is_err());
        assert!(YearMonth::parse("24-03").is_err());
    }

    #[test]
    fn orders_chronologically() {
        let dec = YearMonth::parse("2023-12").unwrap();
        let jan = YearMonth::parse("2024-01").unwrap();
        assert!(dec < jan);
    }

    #[test]
    fn parses_through_from_str() {
        let month: YearMonth = "2024-03-15".parse().unwrap();
        assert_eq!(month, YearMonth::new(2024, 3).unwrap());
        assert!("spring".parse::<YearMonth>().is_err());
    }

    #[test]
    fn renders_short_label() {
        assert_eq!(YearMonth::parse("2024-01").unwrap().label(), "Jan 2024");
    }
}
