//! Pure diffing of scraped state against stored state.

use super::location::{ClassifiedLocation, LocationClassifier};
use crate::db::{CourseUpdate, DbCourse, DbSection, InstructionType, SectionPatch};
use crate::source::SectionDetails;
use crate::terms::Semester;
use std::collections::HashSet;
use std::hash::Hash;

/// Elements present on only one side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T> {
    pub only_in_a: Vec<T>,
    pub only_in_b: Vec<T>,
}

impl<T> SetDiff<T> {
    /// True if both sides hold the same elements, ignoring order and duplicates.
    pub fn is_equal(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

/// Compares two unordered collections. Each side of the result keeps the
/// first-seen order of its input and holds no duplicates.
pub fn set_diff<T>(a: &[T], b: &[T]) -> SetDiff<T>
where
    T: Eq + Hash + Clone,
{
    let a_set: HashSet<&T> = a.iter().collect();
    let b_set: HashSet<&T> = b.iter().collect();

    SetDiff {
        only_in_a: unique_not_in(a, &b_set),
        only_in_b: unique_not_in(b, &a_set),
    }
}

fn unique_not_in<'a, T>(items: &'a [T], other: &HashSet<&'a T>) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| !other.contains(item) && seen.insert(*item))
        .cloned()
        .collect()
}

/// The jointly consistent location columns of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLocation {
    pub instruction_type: InstructionType,
    pub building_name: Option<String>,
    pub room: Option<String>,
}

impl SectionLocation {
    pub fn of(section: &DbSection) -> Self {
        Self {
            instruction_type: section.instruction_type,
            building_name: section.building_name.clone(),
            room: section.room.clone(),
        }
    }
}

/// Outcome of mapping a classified location onto stored columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub location: SectionLocation,
    /// Set when the location named a building that isn't in the known list.
    pub unmatched_building: Option<String>,
}

/// Maps a classified location onto section columns. Only physical
/// locations carry a room, and only known buildings are referenced.
pub fn resolve_location(
    classified: ClassifiedLocation,
    classifier: &LocationClassifier,
) -> ResolvedLocation {
    let instruction_type = classified.instruction_type();

    match classified {
        ClassifiedLocation::Physical { building, room } => {
            let known = classifier.is_known(&building);
            ResolvedLocation {
                location: SectionLocation {
                    instruction_type,
                    building_name: known.then(|| building.clone()),
                    room: Some(room),
                },
                unmatched_building: (!known).then_some(building),
            }
        }
        _ => ResolvedLocation {
            location: SectionLocation {
                instruction_type,
                building_name: None,
                room: None,
            },
            unmatched_building: None,
        },
    }
}

/// Builds the minimal patch turning the stored section into the scraped one.
pub fn diff_section(
    stored: &SectionLocation,
    stored_instructor_ids: &[i64],
    scraped: &SectionLocation,
    scraped_instructor_ids: &[i64],
) -> SectionPatch {
    let instructors = set_diff(scraped_instructor_ids, stored_instructor_ids);

    SectionPatch {
        instruction_type: (stored.instruction_type != scraped.instruction_type)
            .then_some(scraped.instruction_type),
        building_name: (stored.building_name != scraped.building_name)
            .then(|| scraped.building_name.clone()),
        room: (stored.room != scraped.room).then(|| scraped.room.clone()),
        connect_instructors: instructors.only_in_a,
        disconnect_instructors: instructors.only_in_b,
    }
}

/// Converts scraped offered semesters, dropping duplicates.
pub fn scraped_semesters(details: &SectionDetails) -> Vec<Semester> {
    let mut offered: Vec<Semester> = Vec::with_capacity(details.semesters_offered.len());
    for semester in details.semesters_offered.iter().copied().map(Semester::from) {
        if !offered.contains(&semester) {
            offered.push(semester);
        }
    }
    offered
}

/// Returns the course rewrite needed, if any scraped course field differs.
pub fn diff_course(stored: &DbCourse, details: &SectionDetails) -> Option<CourseUpdate> {
    let offered = scraped_semesters(details);

    let changed = !set_diff(&offered, &stored.offered).is_equal()
        || details.description != stored.description
        || details.prereqs != stored.prereqs;

    changed.then(|| CourseUpdate {
        description: details.description.clone(),
        prereqs: details.prereqs.clone(),
        offered,
    })
}
