/// Database module for the stored catalog: courses, sections, instructors and buildings
mod error;
pub mod memory;
pub mod sqlite;
mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryCatalogStore;
pub use sqlite::SqliteCatalogStore;
pub use types::*;

use crate::terms::Term;
use async_trait::async_trait;

/// Escape character used in `LIKE` patterns handed to [`CatalogStore::find_instructors_like`].
pub const LIKE_ESCAPE: char = '\\';

/// Persistence contract consumed by the reconciler.
///
/// Implementations must distinguish a uniqueness violation on
/// [`create_instructor`](CatalogStore::create_instructor) by returning
/// [`StoreError::Conflict`].
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All known buildings.
    async fn list_buildings(&self) -> StoreResult<Vec<DbBuilding>>;

    /// One page of non-deleted sections whose course belongs to one of
    /// `terms`, ordered by section id ascending.
    async fn find_sections_page(
        &self,
        terms: &[Term],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<SectionRecord>>;

    /// Instructors whose full name matches any of the `LIKE` patterns
    /// (`%` wildcard, `_` single character, [`LIKE_ESCAPE`] escape), case-sensitive.
    async fn find_instructors_like(&self, patterns: &[String]) -> StoreResult<Vec<DbInstructor>>;

    /// The instructor with exactly this full name.
    async fn find_instructor_by_name(&self, full_name: &str) -> StoreResult<Option<DbInstructor>>;

    /// Inserts a new instructor.
    async fn create_instructor(&self, full_name: &str) -> StoreResult<DbInstructor>;

    /// Applies a non-empty section patch and bumps the section's `updated_at`.
    async fn update_section(&self, section_id: i64, patch: &SectionPatch) -> StoreResult<()>;

    /// Rewrites the scraped course fields and bumps the course's `updated_at`.
    async fn update_course(&self, course_id: i64, update: &CourseUpdate) -> StoreResult<()>;
}

/// Escapes `LIKE` metacharacters so `s` only matches itself.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Case-sensitive `LIKE` matching with the same semantics as the sqlite store.
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    like_matches_from(&pattern, &text)
}

fn like_matches_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => (0..=text.len()).any(|i| like_matches_from(&pattern[1..], &text[i..])),
        Some('_') => !text.is_empty() && like_matches_from(&pattern[1..], &text[1..]),
        Some(&c) => {
            let (literal, rest) = if c == LIKE_ESCAPE && pattern.len() > 1 {
                (pattern[1], &pattern[2..])
            } else {
                (c, &pattern[1..])
            };
            text.first() == Some(&literal) && like_matches_from(rest, &text[1..])
        }
    }
}
