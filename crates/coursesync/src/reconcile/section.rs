//! Reconciliation of a single stored section.

use super::diff::{diff_course, diff_section, resolve_location, SectionLocation};
use super::instructors::InstructorMatcher;
use super::location::LocationClassifier;
use super::throttle::RateLimiter;
use super::SyncError;
use crate::db::{CatalogStore, SectionRecord};
use crate::source::{SectionDetailSource, SectionDetailsQuery};
use tracing::{debug, warn};

/// What happened to one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOutcome {
    /// The registrar no longer lists the section's course.
    Skipped,
    Reconciled {
        section_updated: bool,
        course_updated: bool,
        instructors_created: usize,
    },
}

/// Brings one stored section in line with the registrar.
pub struct SectionReconciler<'a> {
    store: &'a dyn CatalogStore,
    source: &'a dyn SectionDetailSource,
    limiter: &'a RateLimiter,
    classifier: &'a LocationClassifier,
}

impl<'a> SectionReconciler<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        source: &'a dyn SectionDetailSource,
        limiter: &'a RateLimiter,
        classifier: &'a LocationClassifier,
    ) -> Self {
        Self {
            store,
            source,
            limiter,
            classifier,
        }
    }

    /// Fetches the section's details and applies the minimal writes.
    ///
    /// A course the registrar doesn't know is skipped with a warning. Any
    /// other fetch or store failure is returned.
    pub async fn reconcile(&self, record: &SectionRecord) -> Result<SectionOutcome, SyncError> {
        let section = &record.section;
        let course = &record.course;
        let query = SectionDetailsQuery {
            subject: course.subject.clone(),
            crse: course.crse.clone(),
            crn: section.crn.clone(),
            term: course.term().to_date(),
        };

        let details = match self
            .limiter
            .run(self.source.get_section_details(&query))
            .await
        {
            Ok(details) => details,
            Err(e) if e.is_not_found() => {
                warn!(
                    section_id = section.id,
                    subject = %course.subject,
                    crse = %course.crse,
                    crn = %section.crn,
                    "Course not found at registrar, skipping section"
                );
                return Ok(SectionOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        let resolutions = InstructorMatcher::new(self.store)
            .resolve_all(&details.instructors, &record.instructor_ids)
            .await?;
        let scraped_ids: Vec<i64> = resolutions.iter().map(|r| r.id).collect();
        let instructors_created = resolutions.iter().filter(|r| r.created).count();

        let classified = self.classifier.classify(Some(&details.location));
        let resolved = resolve_location(classified, self.classifier);
        if let Some(building) = &resolved.unmatched_building {
            warn!(
                section_id = section.id,
                building = %building,
                location = %details.location,
                "Location names an unknown building"
            );
        }

        let patch = diff_section(
            &SectionLocation::of(section),
            &record.instructor_ids,
            &resolved.location,
            &scraped_ids,
        );
        let section_updated = !patch.is_empty();
        if section_updated {
            debug!(
                section_id = section.id,
                location_changed = patch.touches_location(),
                connected = patch.connect_instructors.len(),
                disconnected = patch.disconnect_instructors.len(),
                "Updating section"
            );
            self.store.update_section(section.id, &patch).await?;
        }

        let course_update = diff_course(course, &details);
        let course_updated = course_update.is_some();
        if let Some(update) = course_update {
            debug!(course_id = course.id, "Updating course");
            self.store.update_course(course.id, &update).await?;
        }

        Ok(SectionOutcome::Reconciled {
            section_updated,
            course_updated,
            instructors_created,
        })
    }
}
