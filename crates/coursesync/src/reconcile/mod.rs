//! Reconciliation of stored sections against registrar details.
//!
//! [`BatchDriver`] pages through stored sections and hands each one to a
//! [`SectionReconciler`], which fetches the registrar's view through the
//! shared [`RateLimiter`], diffs it against the stored row and writes only
//! what changed.

pub mod batch;
pub mod diff;
pub mod instructors;
pub mod location;
pub mod section;
pub mod throttle;

pub use batch::{BatchDriver, RunSummary};
pub use instructors::{InstructorMatcher, Resolution};
pub use location::{ClassifiedLocation, LocationClassifier};
pub use section::{SectionOutcome, SectionReconciler};
pub use throttle::RateLimiter;

use crate::db::StoreError;
use crate::source::FetchError;
use thiserror::Error;

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
