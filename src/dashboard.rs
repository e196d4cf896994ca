use tracing::{debug, info, warn};

use crate::db::{QueryError, RowQuery, RowSource};
use crate::models::Row;

/// Identifies one fetch; only the most recently issued ticket may update a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Updated(usize),
    Superseded,
    Failed(QueryError),
}

/// Rows currently backing one dashboard view.
#[derive(Debug, Default)]
pub struct ViewState {
    rows: Vec<Row>,
    issued: u64,
    applied: Option<FetchTicket>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn applied(&self) -> Option<FetchTicket> {
        self.applied
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Applies a finished fetch. Failures and superseded results leave the rows as they were.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Row>, QueryError>,
    ) -> FetchOutcome {
        if ticket.0 != self.issued {
            debug!(ticket = ticket.0, latest = self.issued, "dropping superseded fetch");
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(rows) => {
                let count = rows.len();
                self.rows = rows;
                self.applied = Some(ticket);
                FetchOutcome::Updated(count)
            }
            Err(err) => {
                warn!(%err, "fetch failed, keeping previously loaded rows");
                FetchOutcome::Failed(err)
            }
        }
    }

    pub async fn refresh<S: RowSource>(&mut self, source: &S, query: &RowQuery) -> FetchOutcome {
        let ticket = self.begin_fetch();
        let result = source.query_rows(query).await;
        let outcome = self.complete(ticket, result);
        if let FetchOutcome::Updated(count) = outcome {
            info!(%query, count, "view refreshed");
        }
        outcome
    }
}
