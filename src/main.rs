use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use naloxone_dashboard::config::Config;
use naloxone_dashboard::dashboard::{FetchOutcome, ViewState};
use naloxone_dashboard::db::{self, ColumnFilter, OrderBy, RowQuery, ORDER_TABLE, SURVEY_TABLE};
use naloxone_dashboard::export::{self, Download};
use naloxone_dashboard::filter::{filter_rows, DateRange, FilterOptions};
use naloxone_dashboard::{aggregate, metrics, report};
use naloxone_dashboard::models::{
    Program, ProgramChanges, Row, MONTH_KEY, ORDER_DATE_KEY, ORDER_PROGRAM_KEY, PROGRAM_KEY,
    TOTAL_SURVEYS,
};
use naloxone_dashboard::month::YearMonth;

#[derive(Parser)]
#[command(name = "naloxone-dashboard")]
#[command(about = "Naloxone distribution dashboard for community programs", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Scope {
    /// Program short name; omit for all programs
    #[arg(long)]
    program: Option<String>,
    /// First month to include, as YYYY-MM
    #[arg(long)]
    start: Option<YearMonth>,
    /// Last month to include, as YYYY-MM; an end before the start is raised to it
    #[arg(long)]
    end: Option<YearMonth>,
}

impl Scope {
    fn date_range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
        .clamped()
    }

    fn apply(
        &self,
        rows: &[Row],
        keys: (&str, &str),
        predicate: Option<&dyn Fn(&Row) -> bool>,
    ) -> Vec<Row> {
        let mut options = FilterOptions::default()
            .keys(keys.0, keys.1)
            .date_range(self.date_range());
        if let Some(program) = &self.program {
            options = options.program(program.clone());
        }
        if let Some(predicate) = predicate {
            options = options.predicate(predicate);
        }
        filter_rows(rows, &options)
    }
}

#[derive(Args, Clone)]
struct SurveyScope {
    #[command(flatten)]
    scope: Scope,
    /// Leave out entries with fewer surveys than this
    #[arg(long)]
    min_surveys: Option<i64>,
}

impl SurveyScope {
    fn apply(&self, rows: &[Row]) -> Vec<Row> {
        let min_surveys = self.min_surveys.unwrap_or(0) as f64;
        let busy = move |row: &Row| row.measure(TOTAL_SURVEYS) >= min_surveys;
        let predicate: Option<&dyn Fn(&Row) -> bool> = match self.min_surveys {
            Some(_) => Some(&busy),
            None => None,
        };
        self.scope.apply(rows, (MONTH_KEY, PROGRAM_KEY), predicate)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import monthly survey entries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List programs
    Programs {
        /// Include disabled programs
        #[arg(long)]
        all: bool,
    },
    /// Show one program's metadata
    ProgramShow { shortname: String },
    /// Register a new program
    ProgramAdd {
        #[arg(long)]
        shortname: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        logo: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// Edit program metadata
    ProgramUpdate {
        shortname: String,
        #[arg(long)]
        new_shortname: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        logo: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        disabled: Option<bool>,
    },
    /// Remove a program
    ProgramDelete { shortname: String },
    /// Print headline totals and the monthly survey series
    Summary {
        #[command(flatten)]
        scope: SurveyScope,
    },
    /// Print sum and average of every numeric column
    Stats {
        #[command(flatten)]
        scope: SurveyScope,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: SurveyScope,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export filtered survey entries as CSV
    Export {
        #[command(flatten)]
        scope: SurveyScope,
        /// Output file name inside the export directory
        #[arg(long)]
        file: Option<String>,
    },
    /// Export the order ledger as CSV
    Orders {
        #[command(flatten)]
        scope: Scope,
    },
}

async fn load_rows(source: &db::PgRowSource, query: RowQuery) -> anyhow::Result<ViewState> {
    let mut view = ViewState::new();
    if let FetchOutcome::Failed(err) = view.refresh(source, &query).await {
        return Err(err).with_context(|| format!("failed to load {query}"));
    }
    Ok(view)
}

fn survey_query(program: Option<&str>) -> RowQuery {
    let query = RowQuery::new(SURVEY_TABLE, OrderBy::ascending(MONTH_KEY));
    match program {
        Some(program) => query.filter(ColumnFilter::eq_text(PROGRAM_KEY, program)),
        None => query,
    }
}

fn print_programs(programs: &[Program]) {
    if programs.is_empty() {
        println!("No programs registered.");
        return;
    }
    for program in programs {
        println!(
            "- {} ({}){}",
            program.programname,
            program.programshortname,
            if program.disabled { " [disabled]" } else { "" }
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "naloxone_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config;
    let pool = config.connect().await?;
    let source = config.row_source(&pool);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Wrote {} survey entries from {} ({} skipped).",
                summary.written,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Programs { all } => {
            let programs = db::list_programs(&pool, all).await?;
            print_programs(&programs);
        }
        Commands::ProgramShow { shortname } => match db::get_program(&pool, &shortname).await? {
            Some(program) => {
                print_programs(std::slice::from_ref(&program));
                for (label, value) in [
                    ("Description", &program.programdescription),
                    ("Logo", &program.programlogo),
                    ("URL", &program.programurl),
                ] {
                    if let Some(value) = value {
                        println!("  {label}: {value}");
                    }
                }
            }
            None => println!("No program named {shortname}."),
        },
        Commands::ProgramAdd {
            shortname,
            name,
            description,
            logo,
            url,
            disabled,
        } => {
            let program = db::create_program(
                &pool,
                &Program {
                    id: Uuid::new_v4(),
                    programshortname: shortname,
                    programname: name,
                    programdescription: description,
                    programlogo: logo,
                    programurl: url,
                    disabled,
                },
            )
            .await?;
            println!("Created program {}.", program.programshortname);
        }
        Commands::ProgramUpdate {
            shortname,
            new_shortname,
            name,
            description,
            logo,
            url,
            disabled,
        } => {
            let changes = ProgramChanges {
                programshortname: new_shortname,
                programname: name,
                programdescription: description,
                programlogo: logo,
                programurl: url,
                disabled,
            };
            match db::update_program(&pool, &shortname, &changes).await? {
                Some(program) => println!("Updated program {}.", program.programshortname),
                None => println!("No program named {shortname}."),
            }
        }
        Commands::ProgramDelete { shortname } => {
            if db::delete_program(&pool, &shortname).await? {
                println!("Deleted program {shortname}.");
            } else {
                println!("No program named {shortname}.");
            }
        }
        Commands::Summary { scope } => {
            let view = load_rows(&source, survey_query(scope.scope.program.as_deref())).await?;
            let rows = scope.apply(view.rows());

            if rows.is_empty() {
                println!("No survey entries found for this window.");
                return Ok(());
            }

            println!("Totals:");
            for (label, value) in metrics::totals(&rows).as_pairs() {
                println!("- {label}: {value:.0}");
            }
            println!("Surveys by month:");
            for point in aggregate::aggregate_by_month(&rows, &[TOTAL_SURVEYS]) {
                println!("- {}: {:.0}", point.month_year, point.value(TOTAL_SURVEYS));
            }
        }
        Commands::Stats { scope } => {
            let view = load_rows(&source, survey_query(scope.scope.program.as_deref())).await?;
            let rows = scope.apply(view.rows());
            let stats = metrics::column_stats(&rows);

            if stats.is_empty() {
                println!("No numeric columns in this window.");
                return Ok(());
            }
            for stat in stats {
                println!("- {}: sum {:.0}, average {:.2}", stat.column, stat.sum, stat.average);
            }
        }
        Commands::Report { scope, out } => {
            let range = scope.scope.date_range();
            let view = load_rows(&source, survey_query(None)).await?;
            let rows = scope.apply(view.rows());
            let enabled: Vec<String> = db::list_programs(&pool, false)
                .await?
                .into_iter()
                .map(|program| program.programshortname)
                .collect();
            let all_programs = aggregate::group_by_program(&enabled, view.rows());
            let report =
                report::build_report(scope.scope.program.as_deref(), &range, &rows, &all_programs);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { scope, file } => {
            let range = scope.scope.date_range();
            let view = load_rows(&source, survey_query(scope.scope.program.as_deref())).await?;
            let rows = scope.apply(view.rows());

            if rows.is_empty() {
                println!("Nothing to export for this window.");
                return Ok(());
            }
            let filename = file.unwrap_or_else(|| match (&scope.scope.program, range.is_open()) {
                (Some(program), _) => export::program_file(program),
                (None, true) => export::ALL_ENTRIES_FILE.to_string(),
                (None, false) => export::FILTERED_FILE.to_string(),
            });
            config.downloads().trigger_download(
                &filename,
                export::CSV_MIME,
                &export::to_delimited_text(&rows),
            );
            info!(rows = rows.len(), %filename, "survey export finished");
            println!("Exported {} rows to {}.", rows.len(), filename);
        }
        Commands::Orders { scope } => {
            let view =
                load_rows(&source, RowQuery::new(ORDER_TABLE, OrderBy::ascending(ORDER_DATE_KEY)))
                    .await?;
            let rows = scope.apply(view.rows(), (ORDER_DATE_KEY, ORDER_PROGRAM_KEY), None);

            if rows.is_empty() {
                println!("No orders found for this window.");
                return Ok(());
            }
            config.downloads().trigger_download(
                export::ORDERS_FILE,
                export::CSV_MIME,
                &export::to_delimited_text(&rows),
            );
            println!("Exported {} orders to {}.", rows.len(), export::ORDERS_FILE);
        }
    }

    Ok(())
}
