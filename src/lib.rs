//! Aggregation, filtering and export pipeline behind the naloxone
//! distribution dashboard.
//!
//! Rows come from the backend as flat column maps ([`models::Row`]), are
//! narrowed by [`filter`], summarized by [`aggregate`] and [`metrics`], and
//! written out by [`export`]. [`dashboard::ViewState`] keeps the loaded rows
//! of a view consistent across overlapping fetches.

pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod export;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod month;
pub mod report;
