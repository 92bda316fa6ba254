//! Reconciles the stored course catalog against the registrar's live
//! section details.

pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod reconcile;
pub mod source;
pub mod terms;

pub use reconcile::{BatchDriver, RunSummary, SyncError};
