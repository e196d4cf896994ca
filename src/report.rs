use std::fmt::Write;

use crate::aggregate::{self, ProgramSeries};
use crate::filter::DateRange;
use crate::metrics::{self, Category, GENDER_CATEGORIES, RACE_CATEGORIES};
use crate::models::{
    Row, DISPENSED_INJECT, DISPENSED_NASAL, MONTH_KEY, NEW_REGISTRATIONS, TOTAL_SURVEYS,
    USED_NARCAN,
};
use crate::month::YearMonth;

const MONTHLY_MEASURES: [&str; 5] = [
    TOTAL_SURVEYS,
    DISPENSED_NASAL,
    DISPENSED_INJECT,
    USED_NARCAN,
    NEW_REGISTRATIONS,
];

fn month_label(month: &str) -> String {
    YearMonth::parse(month)
        .map(|m| m.label())
        .unwrap_or_else(|_| month.to_string())
}

fn range_label(range: &DateRange) -> String {
    match (range.start, range.end) {
        (Some(start), Some(end)) => format!("{} to {}", start.label(), end.label()),
        (Some(start), None) => format!("since {}", start.label()),
        (None, Some(end)) => format!("through {}", end.label()),
        (None, None) => "all months".to_string(),
    }
}

fn write_shares(output: &mut String, title: &str, rows: &[Row], categories: &[Category]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");

    let totals = metrics::category_totals(rows, categories);
    let overall: f64 = totals.iter().map(|(_, total)| total).sum();
    if overall == 0.0 {
        let _ = writeln!(output, "No demographic counts reported for this window.");
        return;
    }

    for (category, total) in &totals {
        let _ = writeln!(
            output,
            "- {}: {:.0} ({:.1}%)",
            category.label,
            total,
            total / overall * 100.0
        );
    }

    let points = metrics::share_breakdown(rows, &metrics::fields(categories));
    let _ = writeln!(output);
    let header: Vec<&str> = categories.iter().map(|c| c.label).collect();
    let _ = writeln!(output, "| Month | {} |", header.join(" | "));
    let _ = writeln!(output, "|---|{}", "---|".repeat(categories.len()));
    for point in points {
        let cells: Vec<String> = point
            .shares
            .iter()
            .map(|(_, share)| format!("{share:.1}%"))
            .collect();
        let _ = writeln!(
            output,
            "| {} | {} |",
            month_label(&point.month_year),
            cells.join(" | ")
        );
    }
}

/// Renders the dashboard for one program, or for every program when `program` is `None`.
///
/// `rows` are the filtered rows of the scope; `all_programs` carries every
/// program's series for the average comparison.
pub fn build_report(
    program: Option<&str>,
    range: &DateRange,
    rows: &[Row],
    all_programs: &[ProgramSeries],
) -> String {
    let mut output = String::new();
    let scope_label = program.unwrap_or("all programs");

    let _ = writeln!(output, "# Naloxone Distribution Report");
    let _ = writeln!(
        output,
        "Generated for {} ({})",
        scope_label,
        range_label(range)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");

    if rows.is_empty() {
        let _ = writeln!(output, "No survey entries recorded for this window.");
        return output;
    }

    for (label, value) in metrics::totals(rows).as_pairs() {
        let _ = writeln!(output, "- {label}: {value:.0}");
    }

    let split = metrics::formulation_split(rows);
    let dispensed = split.nasal + split.inject;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Distribution by Formulation");
    if dispensed == 0.0 {
        let _ = writeln!(output, "No units dispensed in this window.");
    } else {
        let _ = writeln!(
            output,
            "- Nasal naloxone: {:.0} ({:.1}%)",
            split.nasal,
            split.nasal / dispensed * 100.0
        );
        let _ = writeln!(
            output,
            "- Injectable naloxone: {:.0} ({:.1}%)",
            split.inject,
            split.inject / dispensed * 100.0
        );
    }

    let monthly = aggregate::aggregate_by_month(rows, &MONTHLY_MEASURES);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Activity");
    let _ = writeln!(
        output,
        "| Month | Surveys | Nasal | Injectable | Uses | New registrations |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for point in &monthly {
        let cells: Vec<String> = MONTHLY_MEASURES
            .iter()
            .map(|measure| format!("{:.0}", point.value(measure)))
            .collect();
        let _ = writeln!(
            output,
            "| {} | {} |",
            month_label(&point.month_year),
            cells.join(" | ")
        );
    }

    let monthly_rows: Vec<Row> = monthly.iter().map(|p| p.to_row(MONTH_KEY)).collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cumulative Naloxone Uses");
    for point in aggregate::cumulative(&monthly_rows, USED_NARCAN) {
        let _ = writeln!(
            output,
            "- {}: {:.0}",
            month_label(&point.month_year),
            point.running_total
        );
    }

    if let Some(series) = program.and_then(|p| {
        all_programs
            .iter()
            .find(|series| series.programshortname == p)
    }) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Naloxone Uses Compared to All-Program Average");
        for point in aggregate::average_comparison(series, all_programs, USED_NARCAN) {
            if !range.is_open()
                && !YearMonth::parse(&point.month_year).is_ok_and(|m| range.contains(m))
            {
                continue;
            }
            let _ = writeln!(
                output,
                "- {}: {:.0} (average {:.1})",
                month_label(&point.month_year),
                point.program_value,
                point.average
            );
        }
    }

    write_shares(&mut output, "Gender Breakdown", rows, &GENDER_CATEGORIES);
    write_shares(&mut output, "Race/Ethnicity Breakdown", rows, &RACE_CATEGORIES);

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PROGRAM_KEY;

    fn survey(program: &str, month: &str, surveys: i64, used: i64) -> Row {
        Row::new()
            .with(PROGRAM_KEY, program)
            .with(MONTH_KEY, month)
            .with(TOTAL_SURVEYS, surveys)
            .with(DISPENSED_NASAL, surveys * 2)
            .with(DISPENSED_INJECT, 1)
            .with(USED_NARCAN, used)
            .with("white_count", 3)
            .with("afam_count", 1)
    }

    #[test]
    fn empty_window_reports_nothing_recorded() {
        let report = build_report(Some("A"), &DateRange::default(), &[], &[]);
        assert!(report.contains("Generated for A (all months)"));
        assert!(report.contains("No survey entries recorded"));
    }

    #[test]
    fn program_report_includes_every_section() {
        let rows = vec![survey("A", "2024-01", 5, 2), survey("A", "2024-02", 3, 4)];
        let all = aggregate::group_by_program(&["A", "B"], &[
            survey("A", "2024-01", 5, 2),
            survey("A", "2024-02", 3, 4),
            survey("B", "2024-01", 4, 6),
        ]);
        let range = DateRange {
            start: YearMonth::new(2024, 1),
            end: YearMonth::new(2024, 2),
        };
        let report = build_report(Some("A"), &range, &rows, &all);

        assert!(report.contains("Generated for A (Jan 2024 to Feb 2024)"));
        assert!(report.contains("- Total surveys: 8"));
        assert!(report.contains("- Total dispensed: 18"));
        assert!(report.contains("| Jan 2024 | 5 | 10 | 1 | 2 | 0 |"));
        assert!(report.contains("- Feb 2024: 6"));
        assert!(report.contains("- Jan 2024: 2 (average 4.0)"));
        assert!(report.contains("- Feb 2024: 4 (average 2.0)"));
        assert!(report.contains("- White: 6 (75.0%)"));
        assert!(report.contains("No demographic counts reported"));
    }
}
