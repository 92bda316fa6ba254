//! In-memory [`CatalogStore`] used by tests and dry runs.
//!
//! Every async operation yields to the scheduler once, so concurrent workers
//! interleave between a read and the write that depends on it the same way
//! they would against a real database.

use super::error::{StoreError, StoreResult};
use super::types::*;
use super::{like_matches, CatalogStore};
use crate::terms::Term;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct MemoryState {
    buildings: BTreeMap<String, DbBuilding>,
    courses: BTreeMap<i64, DbCourse>,
    sections: BTreeMap<i64, DbSection>,
    instructors: BTreeMap<i64, DbInstructor>,
    links: BTreeSet<(i64, i64)>,
    next_id: i64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn instructor_ids(&self, section_id: i64) -> Vec<i64> {
        self.links
            .range((section_id, i64::MIN)..=(section_id, i64::MAX))
            .map(|(_, instructor_id)| *instructor_id)
            .collect()
    }

    fn record(&self, section: &DbSection) -> Option<SectionRecord> {
        let course = self.courses.get(&section.course_id)?;
        Some(SectionRecord {
            section: section.clone(),
            course: course.clone(),
            instructor_ids: self.instructor_ids(section.id),
        })
    }
}

/// In-memory catalog with the same semantics as the sqlite store.
#[derive(Default)]
pub struct MemoryCatalogStore {
    state: RwLock<MemoryState>,
    writes: AtomicUsize,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|e| StoreError::Lock {
            message: e.to_string(),
        })
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|e| StoreError::Lock {
            message: e.to_string(),
        })
    }

    /// Number of `create_instructor`, `update_section` and `update_course`
    /// calls that changed something.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn insert_building(&self, building: DbBuilding) -> StoreResult<()> {
        self.write()?
            .buildings
            .entry(building.name.clone())
            .or_insert(building);
        Ok(())
    }

    pub fn insert_course(&self, course: &NewCourse) -> StoreResult<i64> {
        let mut state = self.write()?;
        let duplicate = state.courses.values().any(|c| {
            c.term() == course.term && c.subject == course.subject && c.crse == course.crse
        });
        if duplicate {
            return Err(StoreError::Conflict {
                entity: "courses".to_string(),
                key: format!("{} {} {}", course.term, course.subject, course.crse),
            });
        }

        let id = state.allocate_id();
        state.courses.insert(
            id,
            DbCourse {
                id,
                year: course.term.year,
                semester: course.term.semester,
                subject: course.subject.clone(),
                crse: course.crse.clone(),
                title: course.title.clone(),
                description: course.description.clone(),
                prereqs: course.prereqs.clone(),
                offered: course.offered.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    pub fn insert_section(&self, section: &NewSection) -> StoreResult<i64> {
        let mut state = self.write()?;
        if !state.courses.contains_key(&section.course_id) {
            return Err(StoreError::NotFound {
                entity: "course".to_string(),
                id: section.course_id.to_string(),
            });
        }

        let id = state.allocate_id();
        state.sections.insert(
            id,
            DbSection {
                id,
                course_id: section.course_id,
                crn: section.crn.clone(),
                instruction_type: section.instruction_type,
                building_name: section.building_name.clone(),
                room: section.room.clone(),
                updated_at: Utc::now(),
                deleted_at: None,
            },
        );
        for instructor_id in &section.instructor_ids {
            state.links.insert((id, *instructor_id));
        }
        Ok(id)
    }

    pub fn soft_delete_section(&self, section_id: i64) -> StoreResult<()> {
        let mut state = self.write()?;
        if let Some(section) = state.sections.get_mut(&section_id) {
            section.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Inserts an instructor with all profile fields; the given id is ignored.
    pub fn insert_instructor(&self, instructor: DbInstructor) -> StoreResult<i64> {
        let mut state = self.write()?;
        if state
            .instructors
            .values()
            .any(|i| i.full_name == instructor.full_name)
        {
            return Err(StoreError::Conflict {
                entity: "instructors".to_string(),
                key: instructor.full_name,
            });
        }

        let id = state.allocate_id();
        state
            .instructors
            .insert(id, DbInstructor { id, ..instructor });
        Ok(id)
    }

    pub fn get_section(&self, section_id: i64) -> StoreResult<Option<SectionRecord>> {
        let state = self.read()?;
        Ok(state
            .sections
            .get(&section_id)
            .and_then(|section| state.record(section)))
    }

    pub fn get_course(&self, course_id: i64) -> StoreResult<Option<DbCourse>> {
        Ok(self.read()?.courses.get(&course_id).cloned())
    }

    pub fn list_instructors(&self) -> StoreResult<Vec<DbInstructor>> {
        Ok(self.read()?.instructors.values().cloned().collect())
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn list_buildings(&self) -> StoreResult<Vec<DbBuilding>> {
        let buildings = self.read()?.buildings.values().cloned().collect();
        tokio::task::yield_now().await;
        Ok(buildings)
    }

    async fn find_sections_page(
        &self,
        terms: &[Term],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<SectionRecord>> {
        let page = {
            let state = self.read()?;
            state
                .sections
                .values()
                .filter(|s| s.deleted_at.is_none())
                .filter_map(|s| state.record(s))
                .filter(|r| terms.contains(&r.course.term()))
                .skip(offset)
                .take(limit)
                .collect()
        };
        tokio::task::yield_now().await;
        Ok(page)
    }

    async fn find_instructors_like(&self, patterns: &[String]) -> StoreResult<Vec<DbInstructor>> {
        let found = self
            .read()?
            .instructors
            .values()
            .filter(|i| patterns.iter().any(|p| like_matches(p, &i.full_name)))
            .cloned()
            .collect();
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn find_instructor_by_name(&self, full_name: &str) -> StoreResult<Option<DbInstructor>> {
        let found = self
            .read()?
            .instructors
            .values()
            .find(|i| i.full_name == full_name)
            .cloned();
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn create_instructor(&self, full_name: &str) -> StoreResult<DbInstructor> {
        tokio::task::yield_now().await;
        let mut state = self.write()?;
        if state.instructors.values().any(|i| i.full_name == full_name) {
            return Err(StoreError::Conflict {
                entity: "instructors".to_string(),
                key: full_name.to_string(),
            });
        }

        let id = state.allocate_id();
        let instructor = DbInstructor {
            id,
            full_name: full_name.to_string(),
            email: None,
            phone: None,
            office: None,
            website_url: None,
            photo_url: None,
            updated_at: Utc::now(),
        };
        state.instructors.insert(id, instructor.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(instructor)
    }

    async fn update_section(&self, section_id: i64, patch: &SectionPatch) -> StoreResult<()> {
        tokio::task::yield_now().await;
        if patch.is_empty() {
            return Ok(());
        }

        let mut state = self.write()?;
        let section = state
            .sections
            .get_mut(&section_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "section".to_string(),
                id: section_id.to_string(),
            })?;

        if let Some(instruction_type) = patch.instruction_type {
            section.instruction_type = instruction_type;
        }
        if let Some(building_name) = &patch.building_name {
            section.building_name = building_name.clone();
        }
        if let Some(room) = &patch.room {
            section.room = room.clone();
        }
        section.updated_at = Utc::now();

        for instructor_id in &patch.disconnect_instructors {
            state.links.remove(&(section_id, *instructor_id));
        }
        for instructor_id in &patch.connect_instructors {
            state.links.insert((section_id, *instructor_id));
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_course(&self, course_id: i64, update: &CourseUpdate) -> StoreResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.write()?;
        let course = state
            .courses
            .get_mut(&course_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "course".to_string(),
                id: course_id.to_string(),
            })?;

        course.description = update.description.clone();
        course.prereqs = update.prereqs.clone();
        course.offered = update.offered.clone();
        course.updated_at = Utc::now();

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
