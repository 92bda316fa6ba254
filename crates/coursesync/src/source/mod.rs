/// Per-section detail lookups against the registrar
mod banweb;
mod error;

pub use banweb::{parse_section_details, BanwebClient, BanwebConfig};
pub use error::FetchError;

use crate::terms::Semester;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifies one section on the registrar's side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionDetailsQuery {
    pub subject: String,
    pub crse: String,
    pub crn: String,
    /// Representative date of the section's term
    pub term: NaiveDate,
}

/// Semester labels as the registrar reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtSemester {
    Fall,
    Spring,
    Summer,
}

impl ExtSemester {
    /// Parses a label like `Fall` or `SPRING`; anything else is ignored.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "fall" => Some(ExtSemester::Fall),
            "spring" => Some(ExtSemester::Spring),
            "summer" => Some(ExtSemester::Summer),
            _ => None,
        }
    }
}

impl From<ExtSemester> for Semester {
    fn from(value: ExtSemester) -> Self {
        match value {
            ExtSemester::Fall => Semester::Fall,
            ExtSemester::Spring => Semester::Spring,
            ExtSemester::Summer => Semester::Summer,
        }
    }
}

/// Scraped details for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDetails {
    pub location: String,
    pub instructors: Vec<String>,
    pub description: Option<String>,
    pub prereqs: Option<String>,
    pub semesters_offered: Vec<ExtSemester>,
}

/// Source of authoritative per-section details.
#[async_trait]
pub trait SectionDetailSource: Send + Sync {
    /// Returns [`FetchError::NotFound`] if the registrar has no such course.
    async fn get_section_details(
        &self,
        query: &SectionDetailsQuery,
    ) -> Result<SectionDetails, FetchError>;
}
