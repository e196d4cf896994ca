use tracing::debug;

use crate::models::{Row, MONTH_KEY, PROGRAM_KEY};
use crate::month::YearMonth;

/// Inclusive month bounds; a missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<YearMonth>,
    pub end: Option<YearMonth>,
}

impl DateRange {
    /// Pulls an end that precedes the start up to the start month.
    pub fn clamped(self) -> Self {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Self {
                start: Some(start),
                end: Some(start),
            },
            _ => self,
        }
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, month: YearMonth) -> bool {
        self.start.map_or(true, |start| month >= start) && self.end.map_or(true, |end| month <= end)
    }
}

pub struct FilterOptions<'a> {
    pub date_range: Option<DateRange>,
    pub program: Option<String>,
    pub predicate: Option<&'a dyn Fn(&Row) -> bool>,
    pub date_key: &'a str,
    pub program_key: &'a str,
}

impl Default for FilterOptions<'_> {
    fn default() -> Self {
        Self {
            date_range: None,
            program: None,
            predicate: None,
            date_key: MONTH_KEY,
            program_key: PROGRAM_KEY,
        }
    }
}

impl<'a> FilterOptions<'a> {
    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn predicate(mut self, predicate: &'a dyn Fn(&Row) -> bool) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn keys(mut self, date_key: &'a str, program_key: &'a str) -> Self {
        self.date_key = date_key;
        self.program_key = program_key;
        self
    }

    fn keeps(&self, row: &Row) -> bool {
        if let Some(range) = self.date_range.filter(|range| !range.is_open()) {
            let Some(raw) = row.text(self.date_key) else {
                debug!(key = self.date_key, "row has no month value, skipping");
                return false;
            };
            match YearMonth::parse(raw) {
                Ok(month) if range.contains(month) => {}
                Ok(_) => return false,
                Err(err) => {
                    debug!(%err, "skipping row with unparseable month");
                    return false;
                }
            }
        }

        if let Some(program) = self.program.as_deref().filter(|p| !p.is_empty()) {
            if row.text(self.program_key) != Some(program) {
                return false;
            }
        }

        self.predicate.map_or(true, |predicate| predicate(row))
    }
}

/// Returns the rows matching every configured option, in input order.
pub fn filter_rows(rows: &[Row], options: &FilterOptions<'_>) -> Vec<Row> {
    rows.iter().filter(|row| options.keeps(row)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ORDER_DATE_KEY, ORDER_PROGRAM_KEY};

    fn survey(program: &str, month: &str, surveys: i64) -> Row {
        Row::new()
            .with(PROGRAM_KEY, program)
            .with(MONTH_KEY, month)
            .with("total_surveys", surveys)
    }

    fn sample() -> Vec<Row> {
        vec![
            survey("A", "2024-01", 5),
            survey("B", "2024-01-01", 7),
            survey("A", "2024-02", 3),
            survey("B", "not a month", 2),
            survey("a", "2024-03-01T00:00:00Z", 1),
        ]
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange {
            start: YearMonth::parse(start).ok(),
            end: YearMonth::parse(end).ok(),
        }
    }

    #[test]
    fn default_options_keep_everything_in_order() {
        let rows = sample();
        assert_eq!(filter_rows(&rows, &FilterOptions::default()), rows);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let options = FilterOptions::default().program("A");
        assert!(filter_rows(&[], &options).is_empty());
    }

    #[test]
    fn single_month_range_keeps_only_that_month() {
        let rows = vec![survey("A", "2024-01", 5), survey("A", "2024-02", 3)];
        let options = FilterOptions::default().date_range(range("2024-01", "2024-01"));
        assert_eq!(filter_rows(&rows, &options), vec![survey("A", "2024-01", 5)]);
    }

    #[test]
    fn date_range_accepts_iso_and_skips_unparseable() {
        let options = FilterOptions::default().date_range(range("2024-01", "2024-03"));
        let kept = filter_rows(&sample(), &options);
        let months: Vec<&str> = kept.iter().filter_map(|r| r.text(MONTH_KEY)).collect();
        assert_eq!(
            months,
            ["2024-01", "2024-01-01", "2024-02", "2024-03-01T00:00:00Z"]
        );
    }

    #[test]
    fn open_bounds_filter_one_side() {
        let rows = sample();
        let from_feb = FilterOptions::default().date_range(DateRange {
            start: YearMonth::new(2024, 2),
            end: None,
        });
        assert_eq!(filter_rows(&rows, &from_feb).len(), 2);

        let inverted = FilterOptions::default().date_range(range("2024-03", "2024-01"));
        assert!(filter_rows(&rows, &inverted).is_empty());
    }

    #[test]
    fn program_match_is_exact_and_case_sensitive() {
        let kept = filter_rows(&sample(), &FilterOptions::default().program("A"));
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.text(PROGRAM_KEY) == Some("A")));

        let everything = filter_rows(&sample(), &FilterOptions::default().program(""));
        assert_eq!(everything.len(), sample().len());
    }

    #[test]
    fn predicate_is_anded_with_other_options() {
        let busy = |row: &Row| row.measure("total_surveys") >= 5.0;
        let options = FilterOptions::default().program("A").predicate(&busy);
        assert_eq!(filter_rows(&sample(), &options), vec![survey("A", "2024-01", 5)]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let busy = |row: &Row| row.measure("total_surveys") > 1.0;
        let options = FilterOptions::default()
            .date_range(range("2024-01", "2024-02"))
            .predicate(&busy);
        let once = filter_rows(&sample(), &options);
        let twice = filter_rows(&once, &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn key_overrides_support_order_rows() {
        let orders = vec![
            Row::new()
                .with(ORDER_DATE_KEY, "2023-05-12")
                .with(ORDER_PROGRAM_KEY, "HRC"),
            Row::new()
                .with(ORDER_DATE_KEY, "2023-07-02")
                .with(ORDER_PROGRAM_KEY, "HRC"),
        ];
        let options = FilterOptions::default()
            .keys(ORDER_DATE_KEY, ORDER_PROGRAM_KEY)
            .program("HRC")
            .date_range(range("2023-05", "2023-06"));
        assert_eq!(filter_rows(&orders, &options), orders[..1].to_vec());
    }

    #[test]
    fn clamping_pulls_end_up_to_start() {
        let rows = sample();
        let clamped = range("2024-02", "2024-01").clamped();
        assert_eq!(clamped, range("2024-02", "2024-02"));
        let kept = filter_rows(&rows, &FilterOptions::default().date_range(clamped));
        assert_eq!(kept, vec![survey("A", "2024-02", 3)]);

        let open = DateRange {
            start: YearMonth::new(2024, 5),
            end: None,
        };
        assert_eq!(open.clamped(), open);
    }
}
