//! HTTP client for Banweb's per-section listing page.
//!
//! The listing page (`bwckschd.p_disp_listcrse`) renders one
//! `table.datadisplaytable` per matching section: a `th.ddtitle` header and a
//! `td.dddefault` body holding the catalog text, labelled fields
//! (`span.fieldlabeltext`) and a nested meeting-times table.

use super::error::FetchError;
use super::{ExtSemester, SectionDetailSource, SectionDetails, SectionDetailsQuery};
use crate::terms::Term;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{CaseSensitivity, ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Base URL for Banweb self-service.
const BANWEB_BASE_URL: &str = "https://banweb7.mtu.edu/owassb";

/// Path of the section listing page.
const LIST_SECTIONS_PATH: &str = "/bwckschd.p_disp_listcrse";

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th.ddtitle").unwrap());
static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.dddefault").unwrap());
static MEETING_TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.datadisplaytable table.datadisplaytable").unwrap());
static HEADER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th.ddheader").unwrap());
static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.dddefault").unwrap());

/// Configuration for the Banweb client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanwebConfig {
    /// Base URL for Banweb self-service
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BanwebConfig {
    fn default() -> Self {
        Self {
            base_url: BANWEB_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 30,
            user_agent: concat!("coursesync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Fetches section details from Banweb.
pub struct BanwebClient {
    client: Client,
    config: BanwebConfig,
}

impl BanwebClient {
    /// Creates a client with the default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(BanwebConfig::default())
    }

    pub fn with_config(config: BanwebConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Builds the listing URL for one section.
    fn section_url(&self, query: &SectionDetailsQuery) -> Result<Url, FetchError> {
        let term = Term::from_date(query.term);
        let url = Url::parse_with_params(
            &format!("{}{}", self.config.base_url, LIST_SECTIONS_PATH),
            &[
                ("term_in", term.banner_code().as_str()),
                ("subj_in", query.subject.as_str()),
                ("crse_in", query.crse.as_str()),
                ("crn_in", query.crn.as_str()),
            ],
        )?;
        Ok(url)
    }
}

#[async_trait]
impl SectionDetailSource for BanwebClient {
    async fn get_section_details(
        &self,
        query: &SectionDetailsQuery,
    ) -> Result<SectionDetails, FetchError> {
        let url = self.section_url(query)?;
        debug!(
            subject = %query.subject,
            crse = %query.crse,
            crn = %query.crn,
            url = %url,
            "Fetching section details"
        );

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::UnexpectedResponse {
                message: format!("Section listing returned status {}", response.status()),
            });
        }

        let html = response.text().await?;

        parse_section_details(&html).ok_or_else(|| FetchError::NotFound {
            subject: query.subject.clone(),
            crse: query.crse.clone(),
            crn: query.crn.clone(),
        })
    }
}

/// Parses a section listing page.
///
/// Returns `None` if the page lists no section.
pub fn parse_section_details(html: &str) -> Option<SectionDetails> {
    let document = Html::parse_document(html);

    document.select(&TITLE_SELECTOR).next()?;
    // The outer body cell comes before the nested meeting cells in document order.
    let body = document.select(&BODY_SELECTOR).next()?;

    let fields = parse_labelled_fields(&body);
    let (location, instructors) = document
        .select(&MEETING_TABLE_SELECTOR)
        .next()
        .map(|table| parse_meeting_table(&table))
        .unwrap_or_default();

    Some(SectionDetails {
        location,
        instructors,
        description: fields.description,
        prereqs: fields.prereqs,
        semesters_offered: fields.semesters_offered,
    })
}

#[derive(Debug, Default)]
struct LabelledFields {
    description: Option<String>,
    prereqs: Option<String>,
    semesters_offered: Vec<ExtSemester>,
}

/// Walks the direct children of the body cell, attributing each text node to
/// the most recent `span.fieldlabeltext` (or to the description before any label).
fn parse_labelled_fields(body: &ElementRef) -> LabelledFields {
    let mut description = Vec::new();
    let mut prereqs = Vec::new();
    let mut offered = Vec::new();
    let mut label: Option<String> = None;

    for child in body.children() {
        if let Some(text) = child.value().as_text() {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match label.as_deref() {
                None => description.push(text.to_string()),
                Some("pre-requisite(s)") | Some("prerequisites") => prereqs.push(text.to_string()),
                Some("semesters offered") => offered.push(text.to_string()),
                Some(_) => {}
            }
        } else if let Some(element) = ElementRef::wrap(child) {
            if element
                .value()
                .has_class("fieldlabeltext", CaseSensitivity::AsciiCaseInsensitive)
            {
                let text = element.text().collect::<String>();
                label = Some(text.trim().trim_end_matches(':').trim().to_lowercase());
            }
        }
    }

    let mut semesters_offered = Vec::new();
    for semester in offered
        .iter()
        .flat_map(|line| line.split(|c: char| c == ',' || c == '/'))
        .flat_map(|part| part.split_whitespace())
        .filter_map(ExtSemester::parse)
    {
        if !semesters_offered.contains(&semester) {
            semesters_offered.push(semester);
        }
    }

    LabelledFields {
        description: join_non_empty(&description),
        prereqs: join_non_empty(&prereqs),
        semesters_offered,
    }
}

fn join_non_empty(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Extracts the location of the first meeting and the instructors of all meetings.
fn parse_meeting_table(table: &ElementRef) -> (String, Vec<String>) {
    let headers: Vec<String> = table
        .select(&HEADER_SELECTOR)
        .map(|th| th.text().collect::<String>().trim().to_lowercase())
        .collect();
    let where_idx = headers.iter().position(|h| h == "where");
    let instructors_idx = headers.iter().position(|h| h.starts_with("instructor"));

    let mut location: Option<String> = None;
    let mut instructors: Vec<String> = Vec::new();

    for row in table.select(&ROW_SELECTOR) {
        let cells: Vec<String> = row
            .select(&CELL_SELECTOR)
            .map(|td| collapse_whitespace(&td.text().collect::<String>()))
            .collect();
        if cells.is_empty() {
            continue;
        }

        if location.is_none() {
            location = where_idx.and_then(|i| cells.get(i)).cloned();
        }

        if let Some(cell) = instructors_idx.and_then(|i| cells.get(i)) {
            for name in cell.split(',') {
                let name = collapse_whitespace(&name.replace("(P)", ""));
                if name.is_empty() || name == "TBA" || instructors.contains(&name) {
                    continue;
                }
                instructors.push(name);
            }
        }
    }

    (location.unwrap_or_default(), instructors)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
