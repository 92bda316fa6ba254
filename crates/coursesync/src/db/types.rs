/// Database types for catalog data
use crate::terms::{Semester, Term};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a section is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstructionType {
    Online,
    Remote,
    Physical,
    Unknown,
}

impl InstructionType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            InstructionType::Online => "ONLINE",
            InstructionType::Remote => "REMOTE",
            InstructionType::Physical => "PHYSICAL",
            InstructionType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ONLINE" => Some(InstructionType::Online),
            "REMOTE" => Some(InstructionType::Remote),
            "PHYSICAL" => Some(InstructionType::Physical),
            "UNKNOWN" => Some(InstructionType::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbBuilding {
    pub name: String,
    pub short_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl DbBuilding {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            latitude: None,
            longitude: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbCourse {
    pub id: i64,
    pub year: i32,
    pub semester: Semester,
    pub subject: String,
    pub crse: String,
    pub title: String,
    pub description: Option<String>,
    pub prereqs: Option<String>,
    pub offered: Vec<Semester>,
    pub updated_at: DateTime<Utc>,
}

impl DbCourse {
    pub fn term(&self) -> Term {
        Term::new(self.year, self.semester)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbSection {
    pub id: i64,
    pub course_id: i64,
    pub crn: String,
    pub instruction_type: InstructionType,
    pub building_name: Option<String>,
    pub room: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbInstructor {
    pub id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub office: Option<String>,
    pub website_url: Option<String>,
    pub photo_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DbInstructor {
    /// Number of unset auxiliary profile fields.
    pub fn null_field_count(&self) -> usize {
        [
            &self.email,
            &self.phone,
            &self.office,
            &self.website_url,
            &self.photo_url,
        ]
        .iter()
        .filter(|f| f.is_none())
        .count()
    }
}

/// A section joined with its course and its connected instructor ids
/// (ascending).
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRecord {
    pub section: DbSection,
    pub course: DbCourse,
    pub instructor_ids: Vec<i64>,
}

/// Course fields used when seeding a store.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub term: Term,
    pub subject: String,
    pub crse: String,
    pub title: String,
    pub description: Option<String>,
    pub prereqs: Option<String>,
    pub offered: Vec<Semester>,
}

impl NewCourse {
    pub fn new(term: Term, subject: &str, crse: &str) -> Self {
        Self {
            term,
            subject: subject.to_string(),
            crse: crse.to_string(),
            title: String::new(),
            description: None,
            prereqs: None,
            offered: Vec::new(),
        }
    }
}

/// Section fields used when seeding a store.
#[derive(Debug, Clone)]
pub struct NewSection {
    pub course_id: i64,
    pub crn: String,
    pub instruction_type: InstructionType,
    pub building_name: Option<String>,
    pub room: Option<String>,
    pub instructor_ids: Vec<i64>,
}

impl NewSection {
    pub fn new(course_id: i64, crn: &str) -> Self {
        Self {
            course_id,
            crn: crn.to_string(),
            instruction_type: InstructionType::Unknown,
            building_name: None,
            room: None,
            instructor_ids: Vec::new(),
        }
    }
}

/// Changes to apply to a section. `None` leaves a column untouched;
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionPatch {
    pub instruction_type: Option<InstructionType>,
    pub building_name: Option<Option<String>>,
    pub room: Option<Option<String>>,
    pub connect_instructors: Vec<i64>,
    pub disconnect_instructors: Vec<i64>,
}

impl SectionPatch {
    pub fn is_empty(&self) -> bool {
        self.instruction_type.is_none()
            && self.building_name.is_none()
            && self.room.is_none()
            && self.connect_instructors.is_empty()
            && self.disconnect_instructors.is_empty()
    }

    /// True if any of the location columns change.
    pub fn touches_location(&self) -> bool {
        self.instruction_type.is_some() || self.building_name.is_some() || self.room.is_some()
    }
}

/// Full rewrite of the scraped course fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseUpdate {
    pub description: Option<String>,
    pub prereqs: Option<String>,
    pub offered: Vec<Semester>,
}
