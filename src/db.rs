use std::fmt;
use std::future::Future;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Program, ProgramChanges, Row, SurveyEntry};
use crate::month::YearMonth;

pub const SURVEY_TABLE: &str = "program_survey_entries";
pub const ORDER_TABLE: &str = "old_orders";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("query against {table} failed: {message}")]
    Backend { table: String, message: String },
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("could not decode row from {table}: {message}")]
    Decode { table: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => " = ",
            FilterOp::Neq => " <> ",
            FilterOp::Gt => " > ",
            FilterOp::Gte => " >= ",
            FilterOp::Lt => " < ",
            FilterOp::Lte => " <= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl ColumnFilter {
    pub fn new(column: &str, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    pub fn eq_text(column: &str, value: impl Into<String>) -> Self {
        Self::new(column, FilterOp::Eq, FilterValue::Text(value.into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }
}

/// A fetch of one table: what to read, narrowed and ordered server side.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub filters: Vec<ColumnFilter>,
    pub order: OrderBy,
}

impl RowQuery {
    pub fn new(table: &str, order: OrderBy) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order,
        }
    }

    pub fn filter(mut self, filter: ColumnFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl fmt::Display for RowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} filters)", self.table, self.filters.len())
    }
}

/// Backend that hands out flat rows for a table.
pub trait RowSource {
    fn query_rows(
        &self,
        query: &RowQuery,
    ) -> impl Future<Output = Result<Vec<Row>, QueryError>> + Send;
}

#[derive(Debug, Clone)]
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Double-quotes a table or column name after checking its characters.
pub fn quote_ident(name: &str) -> Result<String, QueryError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    if !valid {
        return Err(QueryError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

pub fn build_query(query: &RowQuery) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT row_to_json(t)::text AS row FROM (SELECT * FROM ");
    builder.push(quote_ident(&query.table)?);

    for (index, filter) in query.filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        builder.push(quote_ident(&filter.column)?);
        builder.push(filter.op.sql());
        match &filter.value {
            FilterValue::Text(value) => builder.push_bind(value.clone()),
            FilterValue::Int(value) => builder.push_bind(*value),
            FilterValue::Float(value) => builder.push_bind(*value),
            FilterValue::Bool(value) => builder.push_bind(*value),
        };
    }

    builder.push(") t ORDER BY t.");
    builder.push(quote_ident(&query.order.column)?);
    builder.push(if query.order.ascending { " ASC" } else { " DESC" });
    Ok(builder)
}

impl RowSource for PgRowSource {
    async fn query_rows(&self, query: &RowQuery) -> Result<Vec<Row>, QueryError> {
        let mut builder = build_query(query)?;
        debug!(sql = builder.sql(), "querying rows");

        let records = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| QueryError::Backend {
                table: query.table.clone(),
                message: err.to_string(),
            })?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let text: String = record.try_get("row").map_err(|err| QueryError::Decode {
                table: query.table.clone(),
                message: err.to_string(),
            })?;
            let row: Row = serde_json::from_str(&text).map_err(|err| QueryError::Decode {
                table: query.table.clone(),
                message: err.to_string(),
            })?;
            rows.push(row);
        }

        debug!(table = %query.table, count = rows.len(), "rows fetched");
        Ok(rows)
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn program_from_row(row: &sqlx::postgres::PgRow) -> Program {
    Program {
        id: row.get("id"),
        programshortname: row.get("programshortname"),
        programname: row.get("programname"),
        programdescription: row.get("programdescription"),
        programlogo: row.get("programlogo"),
        programurl: row.get("programurl"),
        disabled: row.get("disabled"),
    }
}

const PROGRAM_COLUMNS: &str =
    "id, programshortname, programname, programdescription, programlogo, programurl, disabled";

pub async fn list_programs(pool: &PgPool, include_disabled: bool) -> anyhow::Result<Vec<Program>> {
    let rows = sqlx::query(&format!(
        "SELECT {PROGRAM_COLUMNS} FROM program_details \
         WHERE $1 OR disabled = FALSE \
         ORDER BY programname"
    ))
    .bind(include_disabled)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(program_from_row).collect())
}

pub async fn get_program(pool: &PgPool, shortname: &str) -> anyhow::Result<Option<Program>> {
    let row = sqlx::query(&format!(
        "SELECT {PROGRAM_COLUMNS} FROM program_details WHERE programshortname = $1"
    ))
    .bind(shortname)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(program_from_row))
}

pub async fn create_program(pool: &PgPool, program: &Program) -> anyhow::Result<Program> {
    let row = sqlx::query(&format!(
        "INSERT INTO program_details ({PROGRAM_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {PROGRAM_COLUMNS}"
    ))
    .bind(program.id)
    .bind(&program.programshortname)
    .bind(&program.programname)
    .bind(&program.programdescription)
    .bind(&program.programlogo)
    .bind(&program.programurl)
    .bind(program.disabled)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to create program {}", program.programshortname))?;

    Ok(program_from_row(&row))
}

pub async fn update_program(
    pool: &PgPool,
    shortname: &str,
    changes: &ProgramChanges,
) -> anyhow::Result<Option<Program>> {
    let row = sqlx::query(&format!(
        "UPDATE program_details SET \
         programshortname = COALESCE($2, programshortname), \
         programname = COALESCE($3, programname), \
         programdescription = COALESCE($4, programdescription), \
         programlogo = COALESCE($5, programlogo), \
         programurl = COALESCE($6, programurl), \
         disabled = COALESCE($7, disabled) \
         WHERE programshortname = $1 \
         RETURNING {PROGRAM_COLUMNS}"
    ))
    .bind(shortname)
    .bind(&changes.programshortname)
    .bind(&changes.programname)
    .bind(&changes.programdescription)
    .bind(&changes.programlogo)
    .bind(&changes.programurl)
    .bind(changes.disabled)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update program {shortname}"))?;

    Ok(row.as_ref().map(program_from_row))
}

pub async fn delete_program(pool: &PgPool, shortname: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM program_details WHERE programshortname = $1")
        .bind(shortname)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete program {shortname}"))?;
    Ok(result.rows_affected() > 0)
}

async fn ensure_program(pool: &PgPool, shortname: &str, name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO program_details (id, programshortname, programname)
        VALUES ($1, $2, $3)
        ON CONFLICT (programshortname) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(shortname)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts or replaces the entry for its program and month.
async fn upsert_entry(pool: &PgPool, entry: &SurveyEntry, month: YearMonth) -> anyhow::Result<u64> {
    let counts = entry.counts();
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO program_survey_entries (id, programshortname, month_year");
    for (column, _) in counts {
        builder.push(", ").push(column);
    }
    builder.push(") VALUES (");
    let mut values = builder.separated(", ");
    values.push_bind(Uuid::new_v4());
    values.push_bind(entry.programshortname.clone());
    values.push_bind(month.to_string());
    for (_, value) in counts {
        values.push_bind(value);
    }
    builder.push(") ON CONFLICT (programshortname, month_year) DO UPDATE SET ");
    let mut updates = builder.separated(", ");
    for (column, _) in counts {
        updates.push(format!("{column} = EXCLUDED.{column}"));
    }

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

const SEED_PROGRAMS: [(&str, &str, i64); 3] = [
    ("SFAF", "San Francisco AIDS Foundation", 42),
    ("GLIDE", "GLIDE Harm Reduction", 27),
    ("HYA", "Homeless Youth Alliance", 15),
];

const SEED_ORDERS: [(&str, i32, u32, i64, i64); 3] = [
    ("SFAF", 2023, 11, 12, 240),
    ("GLIDE", 2023, 12, 0, 120),
    ("HYA", 2024, 1, 24, 96),
];

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    for (shortname, name, base) in SEED_PROGRAMS {
        ensure_program(pool, shortname, name).await?;

        for month in 1..=6u32 {
            let month_key = YearMonth::new(2024, month).context("invalid seed month")?;
            let step = i64::from(month);
            let surveys = base + step * 3;
            let entry = SurveyEntry {
                programshortname: shortname.to_string(),
                month_year: month_key.to_string(),
                total_surveys: surveys,
                total_dispensed_nasal: surveys * 2,
                total_dispensed_inject: surveys / 5,
                used_narcan_count: surveys / 4,
                new_registration_count: surveys / 6,
                unique_service_days: (8 + step).min(22),
                male_count: surveys / 2,
                female_count: surveys / 3,
                trans_male_count: step % 2,
                trans_female_count: 1,
                genderqueer_nonbinary_count: step % 3,
                other_gender_count: 0,
                afam_count: surveys / 4,
                native_count: step % 2,
                asian_count: surveys / 10,
                pi_count: 0,
                white_count: surveys / 3,
                latinx_count: surveys / 5,
            };
            upsert_entry(pool, &entry, month_key).await?;
        }
    }

    for (program, year, month, im_units, nasal_units) in SEED_ORDERS {
        let order_date = NaiveDate::from_ymd_opt(year, month, 15).context("invalid date")?;
        sqlx::query(
            r#"
            INSERT INTO old_orders
            (id, order_date, order_program, "IM Units", "Nasal Units", "Total Naloxone")
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (
                SELECT 1 FROM old_orders WHERE order_date = $2 AND order_program = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_date)
        .bind(program)
        .bind(im_units)
        .bind(nasal_units)
        .bind(im_units + nasal_units)
        .execute(pool)
        .await?;
    }

    info!("seeded {} programs", SEED_PROGRAMS.len());
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Reads survey entries, keeping valid ones with their normalized month.
///
/// Unreadable and invalid records are logged and counted, never fatal.
pub fn parse_entries<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> (Vec<(SurveyEntry, YearMonth)>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;

    for (line, result) in reader.deserialize::<SurveyEntry>().enumerate() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!(record = line + 1, %err, "skipping unreadable survey row");
                skipped += 1;
                continue;
            }
        };
        match entry.validate() {
            Ok(month) => entries.push((entry, month)),
            Err(err) => {
                warn!(record = line + 1, %err, "skipping invalid survey row");
                skipped += 1;
            }
        }
    }

    (entries, skipped)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let (entries, skipped) = parse_entries(reader);
    let mut summary = ImportSummary {
        written: 0,
        skipped,
    };

    for (entry, month) in &entries {
        ensure_program(pool, &entry.programshortname, &entry.programshortname).await?;
        if upsert_entry(pool, entry, *month).await? > 0 {
            summary.written += 1;
        }
    }

    Ok(summary)
}
