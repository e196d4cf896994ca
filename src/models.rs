use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::month::YearMonth;

pub const MONTH_KEY: &str = "month_year";
pub const PROGRAM_KEY: &str = "programshortname";

pub const TOTAL_SURVEYS: &str = "total_surveys";
pub const DISPENSED_NASAL: &str = "total_dispensed_nasal";
pub const DISPENSED_INJECT: &str = "total_dispensed_inject";
pub const TOTAL_DISPENSED: &str = "total_dispensed";
pub const USED_NARCAN: &str = "used_narcan_count";
pub const NEW_REGISTRATIONS: &str = "new_registration_count";
pub const SERVICE_DAYS: &str = "unique_service_days";

pub const ORDER_DATE_KEY: &str = "order_date";
pub const ORDER_PROGRAM_KEY: &str = "order_program";

/// One flat record from the backend, keyed by column name in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Numeric value of `key`, with anything missing or non-numeric counted as 0.
    pub fn measure(&self, key: &str) -> f64 {
        self.0.get(key).and_then(numeric).unwrap_or(0.0)
    }

    /// Nasal plus injectable units; any stored `total_dispensed` column is ignored.
    pub fn total_dispensed(&self) -> f64 {
        self.measure(DISPENSED_NASAL) + self.measure(DISPENSED_INJECT)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Coerces a JSON value to a number: numbers and numeric strings count, nothing else does.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Whole values become JSON integers so exports print `5` rather than `5.0`.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("program short name is empty")]
    EmptyProgram,
    #[error(transparent)]
    Month(#[from] crate::month::ParseError),
    #[error("column {0} is negative")]
    Negative(&'static str),
}

/// Blank or absent count cells read as 0.
fn count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

/// Typed view of a monthly survey row as stored in `program_survey_entries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyEntry {
    pub programshortname: String,
    pub month_year: String,
    #[serde(default, deserialize_with = "count")]
    pub total_surveys: i64,
    #[serde(default, deserialize_with = "count")]
    pub total_dispensed_nasal: i64,
    #[serde(default, deserialize_with = "count")]
    pub total_dispensed_inject: i64,
    #[serde(default, deserialize_with = "count")]
    pub used_narcan_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub new_registration_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub unique_service_days: i64,
    #[serde(default, deserialize_with = "count")]
    pub male_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub female_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub trans_male_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub trans_female_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub genderqueer_nonbinary_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub other_gender_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub afam_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub native_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub asian_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub pi_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub white_count: i64,
    #[serde(default, deserialize_with = "count")]
    pub latinx_count: i64,
}

impl SurveyEntry {
    pub fn counts(&self) -> [(&'static str, i64); 18] {
        [
            (TOTAL_SURVEYS, self.total_surveys),
            (DISPENSED_NASAL, self.total_dispensed_nasal),
            (DISPENSED_INJECT, self.total_dispensed_inject),
            (USED_NARCAN, self.used_narcan_count),
            (NEW_REGISTRATIONS, self.new_registration_count),
            (SERVICE_DAYS, self.unique_service_days),
            ("male_count", self.male_count),
            ("female_count", self.female_count),
            ("trans_male_count", self.trans_male_count),
            ("trans_female_count", self.trans_female_count),
            ("genderqueer_nonbinary_count", self.genderqueer_nonbinary_count),
            ("other_gender_count", self.other_gender_count),
            ("afam_count", self.afam_count),
            ("native_count", self.native_count),
            ("asian_count", self.asian_count),
            ("pi_count", self.pi_count),
            ("white_count", self.white_count),
            ("latinx_count", self.latinx_count),
        ]
    }

    /// Checks the row and returns its month normalized to `YYYY-MM`.
    pub fn validate(&self) -> Result<YearMonth, ValidationError> {
        if self.programshortname.trim().is_empty() {
            return Err(ValidationError::EmptyProgram);
        }
        let month = YearMonth::parse(&self.month_year)?;
        if let Some((column, _)) = self.counts().into_iter().find(|(_, value)| *value < 0) {
            return Err(ValidationError::Negative(column));
        }
        Ok(month)
    }
}

/// Program metadata from `program_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub programshortname: String,
    pub programname: String,
    pub programdescription: Option<String>,
    pub programlogo: Option<String>,
    pub programurl: Option<String>,
    pub disabled: bool,
}

/// Editable program fields; `None` leaves a column unchanged on update.
#[derive(Debug, Clone, Default)]
pub struct ProgramChanges {
    pub programshortname: Option<String>,
    pub programname: Option<String>,
    pub programdescription: Option<String>,
    pub programlogo: Option<String>,
    pub programurl: Option<String>,
    pub disabled: Option<bool>,
}
