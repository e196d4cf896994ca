use std::path::PathBuf;

use serde_json::Value;
use tracing::{error, info};

use crate::models::Row;

pub const CSV_MIME: &str = "text/csv;charset=utf-8";

pub const FILTERED_FILE: &str = "filtered_data.csv";
pub const ALL_ENTRIES_FILE: &str = "all_program_survey_entries.csv";
pub const ORDERS_FILE: &str = "orders_data.csv";

pub fn program_file(program: &str) -> String {
    format!("{program}_p_surveys_data.csv")
}

/// Serializes rows as comma-separated text with the first row's keys as header.
///
/// Values are not quoted, so embedded commas shift columns. Empty input gives
/// an empty string.
pub fn to_delimited_text(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let header: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.join(","));
    for row in rows {
        let cells: Vec<String> = header
            .iter()
            .map(|key| row.get(key).map(cell_text).unwrap_or_default())
            .collect();
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Destination for finished exports.
pub trait Download {
    fn trigger_download(&self, filename: &str, mime_type: &str, content: &str);
}

/// Writes downloads into a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryDownload {
    dir: PathBuf,
}

impl DirectoryDownload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Download for DirectoryDownload {
    fn trigger_download(&self, filename: &str, mime_type: &str, content: &str) {
        let path = self.dir.join(filename);
        if let Err(err) = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, content)) {
            error!(path = %path.display(), %err, "failed to write export");
            return;
        }
        info!(path = %path.display(), mime_type, bytes = content.len(), "export written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MONTH_KEY, PROGRAM_KEY};

    fn rows() -> Vec<Row> {
        vec![
            Row::new()
                .with(PROGRAM_KEY, "A")
                .with(MONTH_KEY, "2024-01")
                .with("total_surveys", 5)
                .with("disabled", false),
            Row::new()
                .with(PROGRAM_KEY, "A")
                .with(MONTH_KEY, "2024-02")
                .with("total_surveys", 2.5)
                .with("disabled", Value::Null),
        ]
    }

    #[test]
    fn writes_header_and_rows() {
        let text = to_delimited_text(&rows());
        assert_eq!(
            text,
            "programshortname,month_year,total_surveys,disabled\n\
             A,2024-01,5,false\n\
             A,2024-02,2.5,"
        );
    }

    #[test]
    fn header_round_trips_column_names() {
        let rows = rows();
        let text = to_delimited_text(&rows);
        let header: Vec<&str> = text.split('\n').next().unwrap().split(',').collect();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(header, keys);
    }

    #[test]
    fn uses_first_row_key_order_for_later_rows() {
        let rows = vec![
            Row::new().with("a", 1).with("b", 2),
            Row::new().with("b", 4).with("c", 9).with("a", 3),
        ];
        assert_eq!(to_delimited_text(&rows), "a,b\n1,2\n3,4");
    }

    #[test]
    fn empty_input_gives_empty_text() {
        assert_eq!(to_delimited_text(&[]), "");
    }

    #[test]
    fn embedded_commas_are_not_quoted() {
        let rows = vec![Row::new().with("note", "one, two")];
        assert_eq!(to_delimited_text(&rows), "note\none, two");
    }

    #[test]
    fn directory_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryDownload::new(dir.path().join("exports"));
        sink.trigger_download(&program_file("SFAF"), CSV_MIME, "a,b\n1,2");

        let written =
            std::fs::read_to_string(dir.path().join("exports").join("SFAF_p_surveys_data.csv"))
                .unwrap();
        assert_eq!(written, "a,b\n1,2");
    }
}
