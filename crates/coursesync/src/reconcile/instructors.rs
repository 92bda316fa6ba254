//! Find-or-create of instructor identities by scraped name.

use crate::db::{escape_like, CatalogStore, DbInstructor, StoreError};
use futures::future::try_join_all;
use std::cmp::Reverse;
use tracing::{debug, warn};

/// The instructor a scraped name settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub id: i64,
    /// True only for the caller whose insert created the row.
    pub created: bool,
}

/// Builds the `LIKE` patterns a stored full name may match for `name`:
/// "first % last", the exact name, "first last", "first last %" and
/// "first % last %", where first and last are the outer whitespace tokens.
pub fn name_patterns(name: &str) -> Vec<String> {
    let exact = escape_like(name);
    let mut tokens = name.split_whitespace();
    let (first, last) = match (tokens.next(), tokens.last()) {
        (Some(first), Some(last)) => (escape_like(first), escape_like(last)),
        (Some(only), None) => (escape_like(only), escape_like(only)),
        _ => return vec![exact],
    };

    let mut patterns = Vec::with_capacity(5);
    for pattern in [
        format!("{first} % {last}"),
        exact,
        format!("{first} {last}"),
        format!("{first} {last} %"),
        format!("{first} % {last} %"),
    ] {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    patterns
}

/// Picks the most complete candidate: fewest null profile fields, then one
/// already linked to the section, then the lowest id.
fn best_match(candidates: &[DbInstructor], linked_ids: &[i64]) -> Option<i64> {
    candidates
        .iter()
        .min_by_key(|i| {
            (
                i.null_field_count(),
                Reverse(linked_ids.contains(&i.id)),
                i.id,
            )
        })
        .map(|i| i.id)
}

/// Resolves scraped instructor names to stored instructor ids.
pub struct InstructorMatcher<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> InstructorMatcher<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    /// Settles on one instructor id for `name`, creating the instructor if
    /// no stored name matches.
    ///
    /// `linked_ids` are the instructors currently linked to the section, used
    /// to break ties between equally complete candidates. A concurrent insert
    /// of the same name is recovered by reading the winner's row; any other
    /// store failure is returned.
    pub async fn resolve(&self, name: &str, linked_ids: &[i64]) -> Result<Resolution, StoreError> {
        let candidates = self.store.find_instructors_like(&name_patterns(name)).await?;
        if let Some(id) = best_match(&candidates, linked_ids) {
            if candidates.len() > 1 {
                debug!(
                    name = %name,
                    candidates = candidates.len(),
                    instructor_id = id,
                    "Multiple instructors matched, picked most complete"
                );
            }
            return Ok(Resolution { id, created: false });
        }

        match self.store.create_instructor(name).await {
            Ok(instructor) => {
                debug!(name = %name, instructor_id = instructor.id, "Created instructor");
                Ok(Resolution {
                    id: instructor.id,
                    created: true,
                })
            }
            Err(e) if e.is_conflict() => {
                let existing = self.store.find_instructor_by_name(name).await?;
                match existing {
                    Some(instructor) => {
                        debug!(
                            name = %name,
                            instructor_id = instructor.id,
                            "Instructor created concurrently, reusing existing row"
                        );
                        Ok(Resolution {
                            id: instructor.id,
                            created: false,
                        })
                    }
                    None => {
                        warn!(name = %name, error = %e, "Conflict on create but no instructor found by name");
                        Err(StoreError::NotFound {
                            entity: "instructor".to_string(),
                            id: name.to_string(),
                        })
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves every non-blank name concurrently; the result keeps the
    /// order of `names`.
    pub async fn resolve_all(
        &self,
        names: &[String],
        linked_ids: &[i64],
    ) -> Result<Vec<Resolution>, StoreError> {
        let names = names.iter().filter(|name| !name.trim().is_empty());
        try_join_all(names.map(|name| self.resolve(name, linked_ids))).await
    }
}
