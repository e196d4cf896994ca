use serde::Serialize;
use serde_json::Value;

use crate::models::{
    Row, DISPENSED_INJECT, DISPENSED_NASAL, MONTH_KEY, NEW_REGISTRATIONS, SERVICE_DAYS,
    TOTAL_SURVEYS, USED_NARCAN,
};

/// A demographic column and the label the dashboard shows for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub field: &'static str,
    pub label: &'static str,
}

const fn category(field: &'static str, label: &'static str) -> Category {
    Category { field, label }
}

pub const GENDER_CATEGORIES: [Category; 6] = [
    category("male_count", "Man"),
    category("female_count", "Woman"),
    category("trans_male_count", "Trans man"),
    category("trans_female_count", "Trans woman"),
    category("genderqueer_nonbinary_count", "Genderqueer/Non-Binary"),
    category("other_gender_count", "Other"),
];

pub const RACE_CATEGORIES: [Category; 6] = [
    category("afam_count", "Black"),
    category("native_count", "American Indian"),
    category("asian_count", "Asian"),
    category("pi_count", "Pacific Islander"),
    category("white_count", "White"),
    category("latinx_count", "Latino"),
];

pub fn fields(categories: &[Category]) -> Vec<&'static str> {
    categories.iter().map(|c| c.field).collect()
}

/// Percentage composition of one row across a set of category columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharePoint {
    pub month_year: String,
    pub shares: Vec<(String, f64)>,
}

impl SharePoint {
    pub fn share(&self, field: &str) -> f64 {
        self.shares
            .iter()
            .find(|(name, _)| name == field)
            .map_or(0.0, |(_, share)| *share)
    }
}

/// Per-row shares of each category, in percent.
///
/// A row whose categories sum to zero is divided by 1, so every share is 0.
pub fn share_breakdown<S: AsRef<str>>(rows: &[Row], category_fields: &[S]) -> Vec<SharePoint> {
    rows.iter()
        .map(|row| {
            let values: Vec<f64> = category_fields
                .iter()
                .map(|field| row.measure(field.as_ref()))
                .collect();
            let total: f64 = values.iter().sum();
            let divisor = if total == 0.0 { 1.0 } else { total };
            SharePoint {
                month_year: row.text(MONTH_KEY).unwrap_or_default().to_string(),
                shares: category_fields
                    .iter()
                    .zip(values)
                    .map(|(field, value)| (field.as_ref().to_string(), value / divisor * 100.0))
                    .collect(),
            }
        })
        .collect()
}

/// Sum of each category over every row.
pub fn category_totals(rows: &[Row], categories: &[Category]) -> Vec<(Category, f64)> {
    categories
        .iter()
        .map(|category| {
            let total: f64 = rows.iter().map(|row| row.measure(category.field)).sum();
            (*category, total)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub total_surveys: f64,
    pub total_dispensed: f64,
    pub used_narcan_count: f64,
    pub new_registration_count: f64,
    pub unique_service_days: f64,
    pub total_dispensed_nasal: f64,
    pub total_dispensed_inject: f64,
}

impl Totals {
    pub fn as_pairs(&self) -> [(&'static str, f64); 7] {
        [
            ("Total surveys", self.total_surveys),
            ("Total dispensed", self.total_dispensed),
            ("Naloxone uses", self.used_narcan_count),
            ("New registrations", self.new_registration_count),
            ("Days with encounters", self.unique_service_days),
            ("Nasal dispensed", self.total_dispensed_nasal),
            ("Injectable dispensed", self.total_dispensed_inject),
        ]
    }
}

pub fn totals(rows: &[Row]) -> Totals {
    rows.iter().fold(Totals::default(), |mut acc, row| {
        acc.total_surveys += row.measure(TOTAL_SURVEYS);
        acc.total_dispensed += row.total_dispensed();
        acc.used_narcan_count += row.measure(USED_NARCAN);
        acc.new_registration_count += row.measure(NEW_REGISTRATIONS);
        acc.unique_service_days += row.measure(SERVICE_DAYS);
        acc.total_dispensed_nasal += row.measure(DISPENSED_NASAL);
        acc.total_dispensed_inject += row.measure(DISPENSED_INJECT);
        acc
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FormulationSplit {
    pub nasal: f64,
    pub inject: f64,
}

pub fn formulation_split(rows: &[Row]) -> FormulationSplit {
    FormulationSplit {
        nasal: rows.iter().map(|row| row.measure(DISPENSED_NASAL)).sum(),
        inject: rows.iter().map(|row| row.measure(DISPENSED_INJECT)).sum(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStat {
    pub column: String,
    pub sum: f64,
    pub average: f64,
}

/// Sum and average of every column that is numeric in the first row.
pub fn column_stats(rows: &[Row]) -> Vec<ColumnStat> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let count = rows.len() as f64;

    first
        .iter()
        .filter(|(_, value)| matches!(value, Value::Number(_)))
        .map(|(column, _)| {
            let sum: f64 = rows.iter().map(|row| row.measure(column)).sum();
            ColumnStat {
                column: column.clone(),
                sum,
                average: if count == 0.0 { 0.0 } else { sum / count },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PROGRAM_KEY, TOTAL_DISPENSED};

    fn race_row(month: &str, counts: [i64; 6]) -> Row {
        let mut row = Row::new().with(MONTH_KEY, month);
        for (category, count) in RACE_CATEGORIES.iter().zip(counts) {
            row.insert(category.field, count);
        }
        row
    }

    #[test]
    fn shares_sum_to_one_hundred() {
        let rows = vec![race_row("2024-01", [3, 0, 1, 0, 6, 2])];
        let points = share_breakdown(&rows, &fields(&RACE_CATEGORIES));
        let sum: f64 = points[0].shares.iter().map(|(_, s)| s).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((points[0].share("white_count") - 50.0).abs() < 1e-9);
        assert_eq!(points[0].month_year, "2024-01");
    }

    #[test]
    fn all_zero_categories_yield_zero_shares() {
        let rows = vec![
            race_row("2024-02", [0; 6]),
            Row::new().with(MONTH_KEY, "2024-03"),
        ];
        for point in share_breakdown(&rows, &fields(&RACE_CATEGORIES)) {
            assert_eq!(point.shares.len(), 6);
            assert!(point.shares.iter().all(|(_, share)| *share == 0.0));
        }
    }

    #[test]
    fn category_totals_sum_each_field() {
        let rows = vec![race_row("2024-01", [1, 2, 3, 4, 5, 6]), race_row("2024-02", [1; 6])];
        let totals = category_totals(&rows, &RACE_CATEGORIES);
        assert_eq!(totals[0].0.label, "Black");
        assert_eq!(totals[0].1, 2.0);
        assert_eq!(totals[5].1, 7.0);
    }

    #[test]
    fn totals_default_missing_fields_to_zero() {
        let rows = vec![
            Row::new()
                .with(PROGRAM_KEY, "A")
                .with(TOTAL_SURVEYS, 5)
                .with(DISPENSED_NASAL, 2)
                .with(DISPENSED_INJECT, 1)
                .with(TOTAL_DISPENSED, 40),
            Row::new()
                .with(PROGRAM_KEY, "A")
                .with(TOTAL_SURVEYS, 3)
                .with(USED_NARCAN, Value::Null)
                .with(DISPENSED_INJECT, 4),
        ];
        let totals = totals(&rows);
        assert_eq!(totals.total_surveys, 8.0);
        assert_eq!(totals.total_dispensed, 7.0);
        assert_eq!(totals.used_narcan_count, 0.0);
        assert_eq!(totals.total_dispensed_nasal, 2.0);
        assert_eq!(totals.total_dispensed_inject, 5.0);
        assert_eq!(super::totals(&[]), Totals::default());
    }

    #[test]
    fn formulation_split_sums_both_kinds() {
        let rows = vec![
            Row::new().with(DISPENSED_NASAL, 10).with(DISPENSED_INJECT, 1),
            Row::new().with(DISPENSED_NASAL, "5"),
        ];
        assert_eq!(
            formulation_split(&rows),
            FormulationSplit {
                nasal: 15.0,
                inject: 1.0
            }
        );
    }

    #[test]
    fn column_stats_use_first_row_shape() {
        let rows = vec![
            Row::new()
                .with(PROGRAM_KEY, "A")
                .with(TOTAL_SURVEYS, 4)
                .with(USED_NARCAN, 1),
            Row::new()
                .with(PROGRAM_KEY, "B")
                .with(TOTAL_SURVEYS, 2)
                .with("late_column", 9),
        ];
        let stats = column_stats(&rows);
        assert_eq!(
            stats,
            vec![
                ColumnStat {
                    column: TOTAL_SURVEYS.to_string(),
                    sum: 6.0,
                    average: 3.0,
                },
                ColumnStat {
                    column: USED_NARCAN.to_string(),
                    sum: 1.0,
                    average: 0.5,
                },
            ]
        );
        assert!(column_stats(&[]).is_empty());
    }
}
