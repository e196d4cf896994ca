use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::models::{number_value, Row, MONTH_KEY, PROGRAM_KEY};

/// Sums of the requested measures for one month key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    pub month_year: String,
    pub measures: Vec<(String, f64)>,
}

impl AggregatedPoint {
    pub fn value(&self, measure: &str) -> f64 {
        self.measures
            .iter()
            .find(|(name, _)| name == measure)
            .map_or(0.0, |(_, value)| *value)
    }

    pub fn to_row(&self, key: &str) -> Row {
        let mut row = Row::new().with(key, self.month_year.clone());
        for (name, value) in &self.measures {
            row.insert(name.clone(), number_value(*value));
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub month_year: String,
    pub running_total: f64,
}

/// One program's monthly rows, as the preview cards hold them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSeries {
    pub programshortname: String,
    pub months: Vec<Row>,
}

impl ProgramSeries {
    fn entry_for(&self, month: &str) -> Option<&Row> {
        self.months
            .iter()
            .find(|row| row.text(MONTH_KEY) == Some(month))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonPoint {
    pub month_year: String,
    pub program_value: f64,
    pub average: f64,
}

pub fn aggregate_by_month<S: AsRef<str>>(rows: &[Row], measures: &[S]) -> Vec<AggregatedPoint> {
    aggregate_by_key(rows, MONTH_KEY, measures)
}

/// Groups rows by the text value of `key` and sums each measure per group.
///
/// Rows lacking the key are skipped. Output is sorted ascending by key, which
/// is chronological for zero-padded `YYYY-MM` keys.
pub fn aggregate_by_key<S: AsRef<str>>(
    rows: &[Row],
    key: &str,
    measures: &[S],
) -> Vec<AggregatedPoint> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for row in rows {
        let Some(group) = row.text(key) else {
            continue;
        };
        let sums = groups
            .entry(group)
            .or_insert_with(|| vec![0.0; measures.len()]);
        for (sum, measure) in sums.iter_mut().zip(measures) {
            *sum += row.measure(measure.as_ref());
        }
    }

    groups
        .into_iter()
        .map(|(group, sums)| AggregatedPoint {
            month_year: group.to_string(),
            measures: measures
                .iter()
                .map(|m| m.as_ref().to_string())
                .zip(sums)
                .collect(),
        })
        .collect()
}

/// Aggregates every column that holds a number in any row, in first-seen order.
pub fn aggregate_all_numeric(rows: &[Row]) -> Vec<AggregatedPoint> {
    let mut measures: Vec<&str> = Vec::new();
    for row in rows {
        for (column, value) in row.iter() {
            if matches!(value, Value::Number(_)) && !measures.contains(&column.as_str()) {
                measures.push(column);
            }
        }
    }
    aggregate_by_month(rows, &measures)
}

/// Running total of `measure` in input order; callers sort by month first.
pub fn cumulative(rows: &[Row], measure: &str) -> Vec<CumulativePoint> {
    let mut running_total = 0.0;
    rows.iter()
        .map(|row| {
            running_total += row.measure(measure);
            CumulativePoint {
                month_year: row.text(MONTH_KEY).unwrap_or_default().to_string(),
                running_total,
            }
        })
        .collect()
}

/// Builds one series per listed program, in list order, from flat survey rows.
///
/// Programs without rows get an empty series; rows of unlisted programs are dropped.
pub fn group_by_program<S: AsRef<str>>(programs: &[S], rows: &[Row]) -> Vec<ProgramSeries> {
    let mut by_program: BTreeMap<&str, Vec<Row>> = BTreeMap::new();
    for row in rows {
        if let Some(program) = row.text(PROGRAM_KEY) {
            by_program.entry(program).or_default().push(row.clone());
        }
    }
    programs
        .iter()
        .map(|program| ProgramSeries {
            programshortname: program.as_ref().to_string(),
            months: by_program.remove(program.as_ref()).unwrap_or_default(),
        })
        .collect()
}

/// Mean of `measure` for `month` across all programs.
///
/// Programs with no entry for the month add nothing to the sum but still count
/// toward the divisor.
pub fn cross_program_average(programs: &[ProgramSeries], month: &str, measure: &str) -> f64 {
    if programs.is_empty() {
        return 0.0;
    }
    let sum: f64 = programs
        .iter()
        .filter_map(|program| program.entry_for(month))
        .map(|row| row.measure(measure))
        .sum();
    sum / programs.len() as f64
}

/// Pairs each month of `program` with the all-program average for that month.
pub fn average_comparison(
    program: &ProgramSeries,
    programs: &[ProgramSeries],
    measure: &str,
) -> Vec<ComparisonPoint> {
    program
        .months
        .iter()
        .filter_map(|row| row.text(MONTH_KEY).map(|month| (month, row)))
        .map(|(month, row)| ComparisonPoint {
            month_year: month.to_string(),
            program_value: row.measure(measure),
            average: cross_program_average(programs, month, measure),
        })
        .collect()
}
