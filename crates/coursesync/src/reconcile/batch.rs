//! Paged reconciliation run over every section of the selected terms.

use super::location::LocationClassifier;
use super::section::{SectionOutcome, SectionReconciler};
use super::throttle::RateLimiter;
use super::SyncError;
use crate::cache::{CacheEvictor, COURSES_KEY, SECTIONS_KEY};
use crate::config::SyncConfig;
use crate::db::CatalogStore;
use crate::source::SectionDetailSource;
use crate::terms::{Term, TermPolicy};
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Sections dispatched per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 32;

/// Totals for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub terms: Vec<Term>,
    pub pages: usize,
    pub sections_seen: usize,
    pub sections_skipped: usize,
    pub sections_updated: usize,
    pub courses_updated: usize,
    pub instructors_created: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: SectionOutcome) {
        match outcome {
            SectionOutcome::Skipped => self.sections_skipped += 1,
            SectionOutcome::Reconciled {
                section_updated,
                course_updated,
                instructors_created,
            } => {
                self.sections_updated += usize::from(section_updated);
                self.courses_updated += usize::from(course_updated);
                self.instructors_created += instructors_created;
            }
        }
    }
}

/// Drives a full reconciliation run.
pub struct BatchDriver {
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn SectionDetailSource>,
    cache: Arc<dyn CacheEvictor>,
    limiter: RateLimiter,
    page_size: usize,
}

impl BatchDriver {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn SectionDetailSource>,
        cache: Arc<dyn CacheEvictor>,
    ) -> Self {
        Self {
            store,
            source,
            cache,
            limiter: RateLimiter::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Builds a driver with the page size and fetch throttle from `config`.
    pub fn from_config(
        config: &SyncConfig,
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn SectionDetailSource>,
        cache: Arc<dyn CacheEvictor>,
    ) -> Self {
        Self::new(store, source, cache)
            .with_page_size(config.page_size)
            .with_limiter(RateLimiter::new(config.fetch_limit, config.fetch_interval()))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Reconciles every non-deleted section of the policy's terms, then
    /// evicts the cached course and section views.
    ///
    /// Each page is dispatched concurrently and fully drained before the
    /// next is read. The first failing section in a page aborts the run.
    pub async fn run(&self, policy: &dyn TermPolicy) -> Result<RunSummary, SyncError> {
        let run_id = generate_run_id();
        let start = Instant::now();
        let terms = policy.terms_to_process();

        info!(
            run_id = %run_id,
            terms = %format_terms(&terms),
            page_size = self.page_size,
            fetch_limit = self.limiter.limit(),
            fetch_interval_ms = self.limiter.interval().as_millis() as u64,
            "Starting reconciliation run"
        );

        let result = self.run_pages(&run_id, terms).await;

        match &result {
            Ok(summary) => {
                self.evict_views(&run_id).await;
                info!(
                    run_id = %run_id,
                    pages = summary.pages,
                    sections = summary.sections_seen,
                    skipped = summary.sections_skipped,
                    sections_updated = summary.sections_updated,
                    courses_updated = summary.courses_updated,
                    instructors_created = summary.instructors_created,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Reconciliation run completed"
                );
            }
            Err(e) => {
                error!(
                    run_id = %run_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Reconciliation run failed"
                );
            }
        }

        result
    }

    /// Drops the cached course and section views. Failures are logged, not returned.
    async fn evict_views(&self, run_id: &str) {
        for key in [COURSES_KEY, SECTIONS_KEY] {
            if let Err(e) = self.cache.evict(key).await {
                warn!(run_id = %run_id, key = %key, error = %e, "Failed to evict cached view");
            }
        }
    }

    async fn run_pages(&self, run_id: &str, terms: Vec<Term>) -> Result<RunSummary, SyncError> {
        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            terms,
            ..RunSummary::default()
        };
        if summary.terms.is_empty() {
            return Ok(summary);
        }

        let buildings = self.store.list_buildings().await?;
        let classifier = LocationClassifier::new(buildings.into_iter().map(|b| b.name));
        let reconciler = SectionReconciler::new(
            self.store.as_ref(),
            self.source.as_ref(),
            &self.limiter,
            &classifier,
        );

        let mut offset = 0;
        loop {
            let page = self
                .store
                .find_sections_page(&summary.terms, offset, self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            summary.pages += 1;
            summary.sections_seen += page.len();
            offset += page.len();

            let outcomes = join_all(page.iter().map(|record| reconciler.reconcile(record))).await;
            for outcome in outcomes {
                summary.record(outcome?);
            }

            info!(
                run_id = %run_id,
                page = summary.pages,
                sections = page.len(),
                "Page reconciled"
            );

            if page.len() < self.page_size {
                break;
            }
        }

        Ok(summary)
    }
}

fn format_terms(terms: &[Term]) -> String {
    terms
        .iter()
        .map(Term::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Generates a short run id for log correlation.
fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictError;
    use crate::db::{
        DbBuilding, DbInstructor, InstructionType, MemoryCatalogStore, NewCourse, NewSection,
    };
    use crate::reconcile::diff::set_diff;
    use crate::reconcile::testing::{details, FakeSource, RecordingEvictor};
    use crate::source::{ExtSemester, FetchError};
    use crate::terms::{ExplicitTerms, Semester};
    use chrono::Utc;
    use std::time::Duration;

    fn fall() -> Term {
        Term::new(2024, Semester::Fall)
    }

    struct Harness {
        store: Arc<MemoryCatalogStore>,
        source: Arc<FakeSource>,
        cache: Arc<RecordingEvictor>,
        course_id: i64,
    }

    impl Harness {
        fn new() -> Self {
            crate::logging::init_test();
            let store = Arc::new(MemoryCatalogStore::new());
            for name in ["Fisher Hall", "Rekhi Hall"] {
                store.insert_building(DbBuilding::named(name)).unwrap();
            }
            let course_id = store.insert_course(&NewCourse::new(fall(), "CS", "1121")).unwrap();

            Self {
                store,
                source: Arc::new(FakeSource::new()),
                cache: Arc::new(RecordingEvictor::new()),
                course_id,
            }
        }

        fn add_section(&self, crn: &str) -> i64 {
            self.store
                .insert_section(&NewSection::new(self.course_id, crn))
                .unwrap()
        }

        fn driver(&self, page_size: usize) -> BatchDriver {
            BatchDriver::new(self.store.clone(), self.source.clone(), self.cache.clone())
                .with_page_size(page_size)
                .with_limiter(RateLimiter::new(2, Duration::ZERO))
        }

        async fn run(&self, page_size: usize) -> Result<RunSummary, SyncError> {
            self.driver(page_size)
                .run(&ExplicitTerms::new(vec![fall()]))
                .await
        }

        fn section(&self, id: i64) -> crate::db::SectionRecord {
            self.store.get_section(id).unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let h = Harness::new();
        let a = h.add_section("80001");
        let b = h.add_section("80002");
        // Both sections belong to the same course, so they report the same course text.
        let with_course_text = |location: &str, instructors: &[&str]| {
            let mut d = details(location, instructors);
            d.description = Some("Intro to programming".to_string());
            d.semesters_offered = vec![ExtSemester::Fall, ExtSemester::Spring];
            d
        };
        h.source.set("80001", with_course_text("Fisher Hall 135", &["Jane Doe", "John Smith"]));
        h.source.set("80002", with_course_text("Online Instruction", &["Jane Doe"]));

        let first = h.run(1).await.unwrap();
        assert_eq!(first.sections_updated, 2);
        assert_eq!(first.courses_updated, 1);
        assert_eq!(first.instructors_created, 2);

        let writes = h.store.write_count();
        let stamps = (h.section(a).section.updated_at, h.section(b).section.updated_at);

        let second = h.run(1).await.unwrap();
        assert_eq!(h.store.write_count(), writes);
        assert_eq!(second.sections_updated, 0);
        assert_eq!(second.courses_updated, 0);
        assert_eq!(second.instructors_created, 0);
        assert_eq!(
            (h.section(a).section.updated_at, h.section(b).section.updated_at),
            stamps
        );
    }

    #[tokio::test]
    async fn test_online_clears_building_and_room() {
        let h = Harness::new();
        let id = h
            .store
            .insert_section(&NewSection {
                instruction_type: InstructionType::Physical,
                building_name: Some("Fisher Hall".to_string()),
                room: Some("135".to_string()),
                ..NewSection::new(h.course_id, "80001")
            })
            .unwrap();
        h.source.set("80001", details("ONLINE - Synchronous", &[]));

        h.run(10).await.unwrap();

        let section = h.section(id).section;
        assert_eq!(section.instruction_type, InstructionType::Online);
        assert_eq!(section.building_name, None);
        assert_eq!(section.room, None);
    }

    #[tokio::test]
    async fn test_known_building_room_is_verbatim() {
        let h = Harness::new();
        let id = h.add_section("80001");
        h.source.set("80001", details("Rekhi Hall G05 (lab)", &[]));

        h.run(10).await.unwrap();

        let section = h.section(id).section;
        assert_eq!(section.instruction_type, InstructionType::Physical);
        assert_eq!(section.building_name.as_deref(), Some("Rekhi Hall"));
        assert_eq!(section.room.as_deref(), Some("G05 (lab)"));
    }

    #[tokio::test]
    async fn test_offered_semesters_rewritten() {
        let h = Harness::new();
        let course_id = h
            .store
            .insert_course(&NewCourse {
                offered: vec![Semester::Fall],
                ..NewCourse::new(fall(), "MA", "3160")
            })
            .unwrap();
        h.store.insert_section(&NewSection::new(course_id, "80001")).unwrap();
        let mut scraped = details("Online", &[]);
        scraped.semesters_offered = vec![ExtSemester::Fall, ExtSemester::Spring, ExtSemester::Summer];
        h.source.set("80001", scraped);

        let summary = h.run(10).await.unwrap();

        assert_eq!(summary.courses_updated, 1);
        let course = h.store.get_course(course_id).unwrap().unwrap();
        assert!(set_diff(
            &course.offered,
            &[Semester::Summer, Semester::Fall, Semester::Spring]
        )
        .is_equal());
    }

    #[tokio::test]
    async fn test_new_instructor_created_once() {
        let h = Harness::new();
        let ids: Vec<i64> = ["80001", "80002", "80003"]
            .iter()
            .map(|crn| {
                h.source.set(crn, details("Online", &["Ada Lovelace"]));
                h.add_section(crn)
            })
            .collect();

        // All three sections share a page and race to create the instructor.
        let summary = h.run(10).await.unwrap();

        assert_eq!(summary.instructors_created, 1);
        let instructors = h.store.list_instructors().unwrap();
        assert_eq!(instructors.len(), 1);
        for id in &ids {
            assert_eq!(h.section(*id).instructor_ids, vec![instructors[0].id]);
        }

        let again = h.run(10).await.unwrap();
        assert_eq!(again.instructors_created, 0);
        assert_eq!(h.store.list_instructors().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_instructor_matched_not_duplicated() {
        let h = Harness::new();
        let existing = h
            .store
            .insert_instructor(DbInstructor {
                id: 0,
                full_name: "Jane A. Doe".to_string(),
                email: Some("jdoe@mtu.edu".to_string()),
                phone: None,
                office: None,
                website_url: None,
                photo_url: None,
                updated_at: Utc::now(),
            })
            .unwrap();
        let id = h.add_section("80001");
        h.source.set("80001", details("Online", &["Jane Doe"]));

        let summary = h.run(10).await.unwrap();

        assert_eq!(summary.instructors_created, 0);
        assert_eq!(h.store.list_instructors().unwrap().len(), 1);
        assert_eq!(h.section(id).instructor_ids, vec![existing]);
    }

    #[tokio::test]
    async fn test_removed_instructor_disconnected_not_deleted() {
        let h = Harness::new();
        let dropped = h.store.create_instructor("John Smith").await.unwrap();
        let kept = h.store.create_instructor("Jane Doe").await.unwrap();
        let id = h
            .store
            .insert_section(&NewSection {
                instruction_type: InstructionType::Online,
                instructor_ids: vec![dropped.id, kept.id],
                ..NewSection::new(h.course_id, "80001")
            })
            .unwrap();
        h.source.set("80001", details("Online", &["Jane Doe"]));

        h.run(10).await.unwrap();

        assert_eq!(h.section(id).instructor_ids, vec![kept.id]);
        assert_eq!(h.store.list_instructors().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_skips_only_that_section() {
        let h = Harness::new();
        let ids: Vec<i64> = (1..=5).map(|i| h.add_section(&format!("8000{i}"))).collect();
        for i in [1, 2, 4, 5] {
            h.source.set(&format!("8000{i}"), details("Fisher Hall 101", &[]));
        }

        let summary = h.run(2).await.unwrap();

        assert_eq!(summary.sections_seen, 5);
        assert_eq!(summary.sections_skipped, 1);
        assert_eq!(summary.sections_updated, 4);
        assert_eq!(summary.pages, 3);
        assert_eq!(h.section(ids[2]).section.instruction_type, InstructionType::Unknown);
        assert_eq!(h.section(ids[4]).section.room.as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn test_deleted_and_other_term_sections_ignored() {
        let h = Harness::new();
        let deleted = h.add_section("80001");
        h.store.soft_delete_section(deleted).unwrap();
        let spring = h
            .store
            .insert_course(&NewCourse::new(Term::new(2025, Semester::Spring), "CS", "1121"))
            .unwrap();
        h.store.insert_section(&NewSection::new(spring, "10001")).unwrap();

        let summary = h.run(10).await.unwrap();

        assert_eq!(summary.sections_seen, 0);
        assert_eq!(h.source.calls(), 0);
    }

    // Current behavior: one failing section aborts the whole run, and
    // sections on later pages are never fetched.
    #[tokio::test]
    async fn test_unexpected_failure_aborts_run() {
        let h = Harness::new();
        for i in 1..=4 {
            let crn = format!("8000{i}");
            h.add_section(&crn);
            h.source.set(&crn, details("Online", &[]));
        }
        h.source.fail(
            "80002",
            FetchError::UnexpectedResponse {
                message: "HTTP 503".to_string(),
            },
        );

        let err = h.run(2).await.unwrap_err();

        assert!(matches!(err, SyncError::Fetch(FetchError::UnexpectedResponse { .. })));
        assert_eq!(h.source.calls(), 2);
        assert!(h.cache.keys().is_empty());
    }

    #[tokio::test]
    async fn test_cache_evicted_after_run() {
        let h = Harness::new();
        h.add_section("80001");
        h.source.set("80001", details("Online", &[]));

        h.run(10).await.unwrap();

        assert_eq!(h.cache.keys(), vec![COURSES_KEY, SECTIONS_KEY]);
    }

    #[tokio::test]
    async fn test_failed_eviction_does_not_fail_run() {
        let h = Harness::new();
        h.cache.fail_with(EvictError::Status {
            key: COURSES_KEY.to_string(),
            status: 503,
        });

        let summary = h.run(10).await.unwrap();

        assert_eq!(summary.sections_seen, 0);
        assert_eq!(h.cache.keys(), vec![COURSES_KEY, SECTIONS_KEY]);
    }

    #[tokio::test]
    async fn test_no_terms_still_evicts() {
        let h = Harness::new();
        h.add_section("80001");

        let summary = h.driver(10).run(&ExplicitTerms::new(Vec::new())).await.unwrap();

        assert_eq!(summary.sections_seen, 0);
        assert_eq!(h.source.calls(), 0);
        assert_eq!(h.cache.keys(), vec![COURSES_KEY, SECTIONS_KEY]);
    }
}
